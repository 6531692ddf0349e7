//! `create-plate` processor

use super::feedback::{feedback_failed, FeedbackKind, FeedbackSender};
use super::validation::validate_create_plate;
use super::{parse_payload, DomainProcessor, ProcessorContext};
use crate::config::ProcessingConfig;
use crate::core::export::PlateExporter;
use crate::domain::errors::ProcessingError;
use crate::domain::feedback::FeedbackMessage;
use crate::domain::messages::{CreatePlateMessage, CreatePlatePayload, DomainMessage};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const CREATE_PLATE_SUBJECT: &str = "create-plate";

/// Validates a plate, exports it and reports the outcome
pub struct CreatePlateProcessor {
    processing: ProcessingConfig,
    exporter: PlateExporter,
    feedback: Arc<FeedbackSender>,
}

impl CreatePlateProcessor {
    pub fn new(context: &ProcessorContext) -> Self {
        Self {
            processing: context.processing.clone(),
            exporter: PlateExporter::new(context.storage.clone()),
            feedback: context.feedback.clone(),
        }
    }

    /// Samples that count as valid once validation and export are done
    fn valid_samples(message: &CreatePlateMessage) -> usize {
        if message.errors().has_message_level_error() {
            return 0;
        }
        message
            .payload
            .plate
            .samples
            .iter()
            .filter(|s| !message.errors().has_sample_error(s.sample_uuid.trim()))
            .count()
    }

    /// Moves the message through validation and, when it is clean, export
    ///
    /// The message always passes the validated stage before it ends exported
    /// or rejected.
    async fn validate_and_export(
        &self,
        message: &mut CreatePlateMessage,
    ) -> Result<(), ProcessingError> {
        let validation = validate_create_plate(message, &self.processing);
        message.mark_validated();

        match (validation.barcode, validation.centre) {
            (Some(barcode), Some(centre)) if message.errors().is_empty() => {
                let export = self.exporter.export(message, &barcode, &centre.name).await?;
                if export.committed() {
                    message.mark_exported();
                } else {
                    message.mark_rejected();
                }
            }
            _ => message.mark_rejected(),
        }
        Ok(())
    }
}

#[async_trait]
impl DomainProcessor for CreatePlateProcessor {
    async fn process(&self, record: Value) -> Result<bool, ProcessingError> {
        let payload: CreatePlatePayload = parse_payload(CREATE_PLATE_SUBJECT, record)?;
        let mut message = DomainMessage::new(payload);
        tracing::info!(
            message_uuid = %message.payload.message_uuid,
            plate_barcode = %message.payload.plate.plate_barcode,
            samples = message.payload.plate.samples.len(),
            "Processing create-plate message"
        );

        self.validate_and_export(&mut message).await?;

        let feedback = FeedbackMessage::new(
            message.payload.message_uuid.as_str(),
            message.payload.plate.samples.len(),
            Self::valid_samples(&message),
            message.errors().errors().to_vec(),
        );
        if let Err(error) = self.feedback.send(FeedbackKind::CreatePlate, &feedback).await {
            let transient = feedback_failed(&error);
            message.add_error(error);
            return Err(transient.into());
        }

        if !message.errors().is_empty() {
            tracing::warn!(
                message_uuid = %message.payload.message_uuid,
                "{}",
                message.errors().summary()
            );
        }
        Ok(true)
    }
}
