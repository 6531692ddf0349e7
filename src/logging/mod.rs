//! Logging and observability
//!
//! Structured logging via `tracing`, with a few macros that keep the field
//! names of recurring pipeline events consistent.
//!
//! # Example
//!
//! ```no_run
//! use labport::logging::init_logging;
//! use labport::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Consumer started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the settlement decision for a delivery
///
/// # Example
///
/// ```no_run
/// use labport::log_settlement;
///
/// log_settlement!(42u64, "ack");
/// ```
#[macro_export]
macro_rules! log_settlement {
    ($delivery_tag:expr, $decision:expr) => {
        tracing::info!(
            delivery_tag = $delivery_tag,
            decision = $decision,
            "Delivery settled"
        );
    };
}

/// Log a scheduled reconnect
///
/// # Example
///
/// ```no_run
/// use labport::log_reconnect;
/// use std::time::Duration;
///
/// log_reconnect!(Duration::from_secs(3), false);
/// ```
#[macro_export]
macro_rules! log_reconnect {
    ($delay:expr, $was_consuming:expr) => {
        tracing::warn!(
            delay_secs = $delay.as_secs(),
            was_consuming = $was_consuming,
            "Reconnecting to broker"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use labport::log_error_with_context;
/// use labport::domain::LabportError;
///
/// let error = LabportError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log a published feedback message
///
/// # Example
///
/// ```no_run
/// use labport::log_feedback_published;
///
/// log_feedback_published!("feedback.created.plate", "m-1", true);
/// ```
#[macro_export]
macro_rules! log_feedback_published {
    ($routing_key:expr, $message_uuid:expr, $error_free:expr) => {
        tracing::info!(
            routing_key = $routing_key,
            message_uuid = %$message_uuid,
            error_free = $error_free,
            "Feedback published"
        );
    };
}
