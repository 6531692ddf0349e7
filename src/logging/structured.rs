//! Structured logging setup using tracing
//!
//! Console output for operators plus an optional JSON file with rotation.
//!
//! # Example
//!
//! ```no_run
//! use labport::logging::init_logging;
//! use labport::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//! ```

use crate::config::LoggingConfig;
use crate::domain::{LabportError, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Guard that must be kept alive for the duration of the program
/// to ensure logs are flushed properly
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            _file_guard: file_guard,
        }
    }
}

/// Initialize the logging system based on configuration
///
/// `RUST_LOG` takes precedence over `log_level_str` when set.
///
/// # Errors
///
/// Returns an error for an unknown log level or when the log directory
/// cannot be created.
pub fn init_logging(log_level_str: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_level = parse_log_level(log_level_str)?;

    // lapin is chatty at debug; keep it one notch quieter than our own target
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("labport={log_level},lapin=warn,tokio_postgres=warn"))
    });

    let mut layers = Vec::new();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_filter(env_filter.clone());

    layers.push(console_layer.boxed());

    let file_guard = if config.local_enabled {
        std::fs::create_dir_all(&config.local_path).map_err(|e| {
            LabportError::Configuration(format!(
                "Failed to create log directory {}: {}",
                config.local_path, e
            ))
        })?;

        let file_appender = RollingFileAppender::new(
            rotation_for(&config.local_rotation),
            &config.local_path,
            "labport.log",
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_writer(non_blocking)
            .with_filter(env_filter);

        layers.push(file_layer.boxed());
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry().with(layers).try_init().map_err(|e| {
        LabportError::Configuration(format!("Failed to install tracing subscriber: {e}"))
    })?;

    tracing::info!(
        local_enabled = config.local_enabled,
        local_path = %config.local_path,
        "Logging initialized"
    );

    Ok(LoggingGuard::new(file_guard))
}

fn rotation_for(name: &str) -> Rotation {
    match name {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

/// Parse log level from string
fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(LabportError::Configuration(format!(
            "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
            level_str
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("trace", Level::TRACE)]
    #[test_case("debug", Level::DEBUG)]
    #[test_case("INFO", Level::INFO)]
    #[test_case("Warn", Level::WARN)]
    #[test_case("error", Level::ERROR)]
    fn test_parse_log_level_valid(input: &str, expected: Level) {
        assert_eq!(parse_log_level(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_log_level_invalid() {
        assert!(parse_log_level("invalid").is_err());
        assert!(parse_log_level("").is_err());
    }

    #[test]
    fn test_rotation_mapping() {
        assert_eq!(rotation_for("hourly"), Rotation::HOURLY);
        assert_eq!(rotation_for("never"), Rotation::NEVER);
        assert_eq!(rotation_for("daily"), Rotation::DAILY);
    }

    #[test]
    fn test_logging_guard_creation() {
        let guard = LoggingGuard::new(None);
        drop(guard);
    }
}
