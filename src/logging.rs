/// Logging setup: a tracing fmt subscriber writing to the configured log
/// file (appending), or stderr when no file is configured.
use crate::config::{ConfigError, LoggingConfig};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Level(#[from] ConfigError),
}

/// Map a configured level name onto a tracing level directive.
///
/// Accepts both tracing names and the Python-style names older config
/// files use (`WARNING`, `CRITICAL`).
pub fn normalize_level(level: &str) -> Result<&'static str, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "" | "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "critical" | "fatal" => Ok("error"),
        other => Err(ConfigError::Invalid(format!(
            "unknown logging.log_level {other:?}"
        ))),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level; `verbose` forces debug.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<(), LoggingError> {
    let level = if verbose {
        "debug"
    } else {
        normalize_level(&config.log_level)?
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    if config.log_filename.as_os_str().is_empty() {
        builder.with_writer(std::io::stderr).init();
        return Ok(());
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_filename)
        .map_err(|e| LoggingError::Open {
            path: config.log_filename.clone(),
            source: e,
        })?;
    builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_level_names() {
        assert_eq!(normalize_level("INFO").unwrap(), "info");
        assert_eq!(normalize_level("WARNING").unwrap(), "warn");
        assert_eq!(normalize_level("CRITICAL").unwrap(), "error");
        assert_eq!(normalize_level("Debug").unwrap(), "debug");
    }

    #[test]
    fn test_empty_level_defaults_to_info() {
        assert_eq!(normalize_level("").unwrap(), "info");
    }

    #[test]
    fn test_unknown_level() {
        assert!(normalize_level("verbose").is_err());
    }

    #[test]
    fn test_init_reports_unopenable_file() {
        let config = LoggingConfig {
            log_level: "info".to_string(),
            log_filename: PathBuf::from("/nonexistent-dir/impossible/madwatch.log"),
        };
        let err = init(&config, false).unwrap_err();
        assert!(matches!(err, LoggingError::Open { .. }));
    }
}
