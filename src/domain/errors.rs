//! Domain error types
//!
//! This module defines the error hierarchy for Labport. Errors are split by the
//! way the pipeline must react to them: transient failures leave a delivery
//! unsettled for redelivery, everything else is resolved into an ack or a
//! dead-letter decision by the dispatcher. No third-party types are exposed.

use thiserror::Error;

/// Main Labport error type
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
pub enum LabportError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Message broker errors
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Schema registry and codec errors
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(String),

    /// Infrastructure failure that should be retried after reconnection
    #[error(transparent)]
    Transient(#[from] TransientError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Broker-specific errors
///
/// Raised by the transport binding and the transport state machine.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Failed to open the AMQP connection
    #[error("Failed to connect to broker: {0}")]
    ConnectionFailed(String),

    /// Failed to open a channel on an open connection
    #[error("Failed to open channel: {0}")]
    ChannelFailed(String),

    /// Broker rejected the prefetch setting
    #[error("Failed to set QoS: {0}")]
    QosFailed(String),

    /// Broker rejected the consumer registration
    #[error("Failed to start consuming from {queue}: {message}")]
    ConsumeFailed { queue: String, message: String },

    /// Ack or nack could not be delivered to the broker
    #[error("Failed to settle delivery {delivery_tag}: {message}")]
    SettleFailed { delivery_tag: u64, message: String },

    /// Publishing a message failed or was not confirmed
    #[error("Failed to publish to {exchange}/{routing_key}: {message}")]
    PublishFailed {
        exchange: String,
        routing_key: String,
        message: String,
    },

    /// An event arrived that the current connection state cannot accept
    #[error("Invalid transport transition: {event} while {state}")]
    InvalidTransition { state: String, event: String },

    /// TLS material could not be loaded
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// Schema registry and codec errors
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Registry could not be reached (network error, timeout, 5xx)
    #[error("Schema registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Registry has no schema for the subject/version pair
    #[error("No schema registered for subject '{subject}' version '{version}'")]
    SchemaNotFound { subject: String, version: String },

    /// Registry answered with something that is not a usable schema
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A required transport header is missing or unreadable
    #[error("Missing or invalid header '{0}'")]
    MissingHeader(String),

    /// Encoder type header names an unsupported encoding
    #[error("Unsupported encoder type: {0}")]
    UnsupportedEncoding(String),

    /// Body bytes do not match the declared schema
    #[error("Failed to decode message body: {0}")]
    DecodeFailed(String),

    /// A record could not be encoded with the requested schema
    #[error("Failed to encode message: {0}")]
    EncodeFailed(String),
}

impl SchemaError {
    /// Whether the failure is infrastructure-related and worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, SchemaError::RegistryUnavailable(_))
    }
}

/// Infrastructure failure that must not be acked or dead-lettered
///
/// Propagates out of delivery handling so that the message stays unsettled
/// and is redelivered once the consumer has reconnected.
#[derive(Debug, Clone, Error)]
#[error("Transient failure: {0}")]
pub struct TransientError(pub String);

impl TransientError {
    /// Creates a new transient error
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error raised by a domain processor
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Storage or broker failure; the delivery is left for redelivery
    #[error(transparent)]
    Transient(#[from] TransientError),

    /// Failure the processor could not classify
    #[error("Unhandled processing error: {0}")]
    Unhandled(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for LabportError {
    fn from(err: std::io::Error) -> Self {
        LabportError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for LabportError {
    fn from(err: serde_json::Error) -> Self {
        LabportError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for LabportError {
    fn from(err: toml::de::Error) -> Self {
        LabportError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labport_error_display() {
        let err = LabportError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_broker_error_conversion() {
        let broker_err = BrokerError::ConnectionFailed("refused".to_string());
        let err: LabportError = broker_err.into();
        assert!(matches!(err, LabportError::Broker(_)));
    }

    #[test]
    fn test_schema_error_transient_classification() {
        assert!(SchemaError::RegistryUnavailable("timeout".to_string()).is_transient());
        assert!(!SchemaError::DecodeFailed("bad bytes".to_string()).is_transient());
        assert!(!SchemaError::SchemaNotFound {
            subject: "create-plate".to_string(),
            version: "9".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_transient_error_is_transparent() {
        let err: LabportError = TransientError::new("database down").into();
        assert_eq!(err.to_string(), "Transient failure: database down");
    }

    #[test]
    fn test_processing_error_from_transient() {
        let err: ProcessingError = TransientError::new("broker gone").into();
        assert!(matches!(err, ProcessingError::Transient(_)));
    }

    #[test]
    fn test_consume_failed_names_queue() {
        let err = BrokerError::ConsumeFailed {
            queue: "heron.plates".to_string(),
            message: "NOT_FOUND".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to start consuming from heron.plates: NOT_FOUND"
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = BrokerError::InvalidTransition {
            state: "Closed".to_string(),
            event: "QosOk".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid transport transition: QosOk while Closed"
        );
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: LabportError = toml_err.into();
        assert!(matches!(err, LabportError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: LabportError = io_err.into();
        assert!(matches!(err, LabportError::Io(_)));
    }
}
