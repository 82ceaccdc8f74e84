use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from madwatch.toml.
///
/// Built once at startup and passed by reference to every component.
/// Nothing mutates it afterwards.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub receiver: ReceiverConfig,
    pub logging: LoggingConfig,
    pub reboot: RebootConfig,
    pub monitor: LoopConfig,
    pub devices: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub mitm_receiver_ip: String,
    pub mitm_receiver_port: u16,
    pub mitm_receiver_status_endpoint: String,
    pub request_timeout_secs: u64,
    pub retry_delay_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    /// Empty means log to stderr.
    pub log_filename: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RebootConfig {
    pub command: String,
    pub cooldown_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub stale_threshold_mins: i64,
    pub cycle_delay_secs: u64,
}

/// Errors that stop the daemon before the monitor loop starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {path} does not exist")]
    Missing { path: PathBuf },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl MonitorConfig {
    /// Load and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: MonitorConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that have no sensible fallback, including every
    /// device entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receiver.mitm_receiver_ip.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "receiver.mitm_receiver_ip must not be empty".to_string(),
            ));
        }
        if self.status_path().is_empty() {
            return Err(ConfigError::Invalid(
                "receiver.mitm_receiver_status_endpoint must not be empty".to_string(),
            ));
        }
        if self.reboot.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "reboot.command must not be empty".to_string(),
            ));
        }
        if self.monitor.stale_threshold_mins < 0 {
            return Err(ConfigError::Invalid(
                "monitor.stale_threshold_mins must not be negative".to_string(),
            ));
        }
        crate::logging::normalize_level(&self.logging.log_level)?;
        self.device_entries()?;
        Ok(())
    }

    /// Device entries as `(name, value)` pairs in file order.
    pub fn device_entries(&self) -> Result<Vec<(String, String)>, ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid(
                "no devices configured in [devices]".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(self.devices.len());
        let mut seen = HashSet::new();
        for (name, value) in &self.devices {
            let value = value.as_str().ok_or_else(|| {
                ConfigError::Invalid(format!("devices.{name} must be a string"))
            })?;
            let origin = crate::registry::origin_of(value);
            if origin.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "devices.{name} has an empty origin"
                )));
            }
            if !seen.insert(origin.to_string()) {
                return Err(ConfigError::Invalid(format!(
                    "devices.{name} repeats origin {origin:?}"
                )));
            }
            entries.push((name.clone(), value.to_string()));
        }
        Ok(entries)
    }

    fn status_path(&self) -> &str {
        self.receiver
            .mitm_receiver_status_endpoint
            .trim()
            .trim_matches('/')
    }

    /// Status endpoint URL: `http://{host}:{port}/{path}/`.
    pub fn status_url(&self) -> String {
        format!(
            "http://{}:{}/{}/",
            self.receiver.mitm_receiver_ip.trim(),
            self.receiver.mitm_receiver_port,
            self.status_path()
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.receiver.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.receiver.retry_delay_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.reboot.cooldown_secs)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_secs(self.monitor.cycle_delay_secs)
    }
}

// --- Default implementations ---

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            mitm_receiver_ip: "127.0.0.1".to_string(),
            mitm_receiver_port: 8000,
            mitm_receiver_status_endpoint: "status".to_string(),
            request_timeout_secs: 30,
            retry_delay_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_filename: PathBuf::new(),
        }
    }
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            command: "/root/adb_scripts/RebootMadDevice.py".to_string(),
            cooldown_secs: 180,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            stale_threshold_mins: 10,
            cycle_delay_secs: 600,
        }
    }
}
