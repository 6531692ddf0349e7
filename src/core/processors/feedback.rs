//! Feedback publishing
//!
//! Encodes a [`FeedbackMessage`] with the registry schema for its subject and
//! publishes it on the feedback exchange.

use crate::adapters::rabbit::{FeedbackPublisher, Headers, OutboundMessage};
use crate::adapters::schema_registry::{Encoding, SchemaCodec};
use crate::config::FeedbackConfig;
use crate::core::dispatch::envelope::{
    ENCODER_TYPE_HEADER, SCHEMA_VERSION_HEADER, SUBJECT_HEADER,
};
use crate::domain::errors::TransientError;
use crate::domain::feedback::{ErrorTypeCode, FeedbackError, FeedbackMessage};
use std::sync::Arc;

/// Which inbound subject a feedback message answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    CreatePlate,
    UpdateSample,
}

impl FeedbackKind {
    pub fn subject(self) -> &'static str {
        match self {
            FeedbackKind::CreatePlate => "create-plate-feedback",
            FeedbackKind::UpdateSample => "update-sample-feedback",
        }
    }

    fn routing_key(self, config: &FeedbackConfig) -> &str {
        match self {
            FeedbackKind::CreatePlate => &config.create_plate_routing_key,
            FeedbackKind::UpdateSample => &config.update_sample_routing_key,
        }
    }
}

/// Encodes and publishes feedback messages
pub struct FeedbackSender {
    codec: Arc<dyn SchemaCodec>,
    publisher: Arc<dyn FeedbackPublisher>,
    config: FeedbackConfig,
    encoding: Encoding,
}

impl FeedbackSender {
    pub fn new(
        codec: Arc<dyn SchemaCodec>,
        publisher: Arc<dyn FeedbackPublisher>,
        config: FeedbackConfig,
    ) -> Self {
        Self {
            codec,
            publisher,
            config,
            encoding: Encoding::Binary,
        }
    }

    /// Publishes with a different body encoding
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Encodes and publishes one feedback message
    ///
    /// # Errors
    ///
    /// Returns the [`FeedbackError`] to report when encoding or publishing
    /// fails. Callers record it and retry the delivery.
    pub async fn send(
        &self,
        kind: FeedbackKind,
        message: &FeedbackMessage,
    ) -> Result<(), FeedbackError> {
        let failure = |description: String| {
            FeedbackError::new(ErrorTypeCode::ExportingPostFeedback, "feedback", description)
        };

        let record = serde_json::to_value(message)
            .map_err(|e| failure(format!("Failed to serialize feedback: {e}")))?;
        let body = self
            .codec
            .encode(kind.subject(), &self.config.schema_version, self.encoding, &record)
            .await
            .map_err(|e| failure(format!("Failed to encode feedback: {e}")))?;

        let mut headers = Headers::new();
        headers.insert(SUBJECT_HEADER.to_string(), kind.subject().to_string());
        headers.insert(
            SCHEMA_VERSION_HEADER.to_string(),
            self.config.schema_version.clone(),
        );
        headers.insert(ENCODER_TYPE_HEADER.to_string(), self.encoding.to_string());

        let routing_key = kind.routing_key(&self.config);
        self.publisher
            .publish(OutboundMessage {
                exchange: self.config.exchange.clone(),
                routing_key: routing_key.to_string(),
                headers,
                body,
            })
            .await
            .map_err(|e| failure(format!("Failed to publish feedback: {e}")))?;

        crate::log_feedback_published!(
            routing_key,
            message.source_message_uuid,
            message.operation_was_error_free
        );
        Ok(())
    }
}

/// The transient error raised after a feedback failure has been recorded
pub(crate) fn feedback_failed(error: &FeedbackError) -> TransientError {
    TransientError::new(error.description.clone())
}
