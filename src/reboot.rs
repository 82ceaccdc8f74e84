/// Recovery action: spawn the external reboot command for a device and let
/// it run detached. A background task reaps the child and logs its outcome.
use crate::config::MonitorConfig;
use std::process::Stdio;
use tokio::process::Command;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum RebootError {
    #[error("failed to spawn recovery command {command} for {origin}: {source}")]
    Spawn {
        command: String,
        origin: String,
        #[source]
        source: std::io::Error,
    },
}

/// Something that can start a corrective action for a device.
pub trait RecoveryAction {
    /// Start the action without waiting for it to finish.
    fn trigger(&self, origin: &str) -> Result<(), RebootError>;
}

/// How a detached recovery command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub origin: String,
    /// None if the process was killed by a signal or could not be reaped.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A running recovery command.
#[derive(Debug)]
pub struct DetachedRecovery {
    pub pid: u32,
    pub outcome: JoinHandle<RecoveryOutcome>,
}

/// Runs `command <origin>` for stalled devices.
#[derive(Debug, Clone)]
pub struct RebootTrigger {
    command: String,
}

impl RebootTrigger {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.reboot.command.trim())
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Spawn the recovery command in its own process group and hand the
    /// child to a background task.
    pub fn spawn(&self, origin: &str) -> Result<DetachedRecovery, RebootError> {
        let child = Command::new(&self.command)
            .arg(origin)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| RebootError::Spawn {
                command: self.command.clone(),
                origin: origin.to_string(),
                source: e,
            })?;

        let pid = child.id().unwrap_or(0);
        tracing::info!(
            command = %self.command,
            origin,
            pid,
            "recovery command started"
        );

        let outcome = tokio::spawn(reap(origin.to_string(), child));
        Ok(DetachedRecovery { pid, outcome })
    }
}

impl RecoveryAction for RebootTrigger {
    fn trigger(&self, origin: &str) -> Result<(), RebootError> {
        let recovery = self.spawn(origin)?;
        tracing::debug!(origin, pid = recovery.pid, "recovery command detached");
        // Dropping the handle detaches the task; it still logs on exit.
        drop(recovery.outcome);
        Ok(())
    }
}

async fn reap(origin: String, child: tokio::process::Child) -> RecoveryOutcome {
    match child.wait_with_output().await {
        Ok(output) => {
            let outcome = RecoveryOutcome {
                origin,
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            };
            if output.status.success() {
                tracing::info!(
                    origin = %outcome.origin,
                    exit_code = ?outcome.exit_code,
                    "recovery command finished"
                );
            } else {
                tracing::warn!(
                    origin = %outcome.origin,
                    exit_code = ?outcome.exit_code,
                    stderr = %outcome.stderr,
                    "recovery command failed"
                );
            }
            if !outcome.stdout.is_empty() {
                tracing::debug!(origin = %outcome.origin, stdout = %outcome.stdout, "recovery command output");
            }
            outcome
        }
        Err(e) => {
            tracing::warn!(origin = %origin, error = %e, "failed to wait for recovery command");
            RecoveryOutcome {
                origin,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn write_script(dir: &std::path::Path, body: &str) -> String {
        let path = dir.join("reboot.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_from_config_trims_command() {
        let mut config = MonitorConfig::default();
        config.reboot.command = "  /opt/reboot.sh ".to_string();
        assert_eq!(RebootTrigger::from_config(&config).command(), "/opt/reboot.sh");
    }

    #[tokio::test]
    async fn test_spawn_passes_origin_as_argument() {
        let trigger = RebootTrigger::new("echo");
        let recovery = trigger.spawn("ATV07").unwrap();
        assert!(recovery.pid > 0);

        let outcome = recovery.outcome.await.unwrap();
        assert_eq!(outcome.origin, "ATV07");
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout, "ATV07");
    }

    #[tokio::test]
    async fn test_spawn_captures_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo \"cannot reach $1\" >&2\nexit 3");

        let recovery = RebootTrigger::new(script).spawn("ATV01").unwrap();
        let outcome = recovery.outcome.await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr, "cannot reach ATV01");
    }

    #[tokio::test]
    async fn test_trigger_does_not_wait_for_completion() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        let script = write_script(
            dir.path(),
            &format!("sleep 0.3\ntouch {}", marker.display()),
        );

        let trigger = RebootTrigger::new(script);
        let start = std::time::Instant::now();
        trigger.trigger("ATV01").unwrap();
        assert!(start.elapsed() < Duration::from_millis(250));
        assert!(!marker.exists());

        // The detached child still runs to completion
        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let trigger = RebootTrigger::new("nonexistent-reboot-binary-xyz");
        let err = trigger.trigger("ATV01").unwrap_err();
        assert!(matches!(err, RebootError::Spawn { .. }));
        assert!(err.to_string().contains("failed to spawn"));
        assert!(err.to_string().contains("ATV01"));
    }
}
