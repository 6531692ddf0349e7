//! `update-sample` processor

use super::feedback::{feedback_failed, FeedbackKind, FeedbackSender};
use super::validation::validate_update_sample;
use super::{parse_payload, DomainProcessor, ProcessorContext};
use crate::core::export::SampleUpdateExporter;
use crate::domain::errors::ProcessingError;
use crate::domain::feedback::FeedbackMessage;
use crate::domain::messages::{DomainMessage, UpdateSampleMessage, UpdateSamplePayload};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const UPDATE_SAMPLE_SUBJECT: &str = "update-sample";

/// Applies sequencing flag updates to a stored sample
pub struct UpdateSampleProcessor {
    exporter: SampleUpdateExporter,
    feedback: Arc<FeedbackSender>,
}

impl UpdateSampleProcessor {
    pub fn new(context: &ProcessorContext) -> Self {
        Self {
            exporter: SampleUpdateExporter::new(context.storage.clone()),
            feedback: context.feedback.clone(),
        }
    }

    async fn validate_and_export(
        &self,
        message: &mut UpdateSampleMessage,
    ) -> Result<(), ProcessingError> {
        let update = validate_update_sample(message);
        message.mark_validated();

        match update {
            Some(update) => match self.exporter.export(message, &update).await? {
                Some(_) => message.mark_exported(),
                None => message.mark_rejected(),
            },
            None => message.mark_rejected(),
        }
        Ok(())
    }
}

#[async_trait]
impl DomainProcessor for UpdateSampleProcessor {
    async fn process(&self, record: Value) -> Result<bool, ProcessingError> {
        let payload: UpdateSamplePayload = parse_payload(UPDATE_SAMPLE_SUBJECT, record)?;
        let mut message = DomainMessage::new(payload);
        tracing::info!(
            message_uuid = %message.payload.message_uuid,
            sample_uuid = %message.payload.sample.sample_uuid,
            "Processing update-sample message"
        );

        self.validate_and_export(&mut message).await?;

        let valid = usize::from(message.errors().is_empty());
        let feedback = FeedbackMessage::new(
            message.payload.message_uuid.as_str(),
            1,
            valid,
            message.errors().errors().to_vec(),
        );
        if let Err(error) = self.feedback.send(FeedbackKind::UpdateSample, &feedback).await {
            let transient = feedback_failed(&error);
            message.add_error(error);
            return Err(transient.into());
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::{InMemoryImportLog, InMemoryMirror, InMemoryStore, Storage};
    use crate::adapters::rabbit::InMemoryPublisher;
    use crate::adapters::schema_registry::JsonCodec;
    use crate::config::{FeedbackConfig, ProcessingConfig};
    use crate::domain::messages::MessageStage;
    use serde_json::json;

    fn processor() -> UpdateSampleProcessor {
        let feedback = FeedbackSender::new(
            Arc::new(JsonCodec::new(["update-sample-feedback"])),
            Arc::new(InMemoryPublisher::new()),
            FeedbackConfig::default(),
        );
        UpdateSampleProcessor::new(&ProcessorContext {
            processing: ProcessingConfig { centres: Vec::new() },
            storage: Storage {
                store: Arc::new(InMemoryStore::new()),
                import_log: Arc::new(InMemoryImportLog::new()),
                mirror: Arc::new(InMemoryMirror::new()),
            },
            feedback: Arc::new(feedback),
        })
    }

    fn message(fields: serde_json::Value) -> UpdateSampleMessage {
        let payload: UpdateSamplePayload = serde_json::from_value(json!({
            "messageUuid": "u-1",
            "messageCreateDateUtc": "2021-03-03T09:00:00Z",
            "sample": { "sampleUuid": "s-1", "updatedFields": fields }
        }))
        .unwrap();
        DomainMessage::new(payload)
    }

    #[tokio::test]
    async fn test_invalid_update_is_rejected_after_validation() {
        let mut message = message(json!([{ "name": "result", "value": "void" }]));
        processor().validate_and_export(&mut message).await.unwrap();
        assert_eq!(message.stage(), MessageStage::Rejected);
    }

    #[tokio::test]
    async fn test_update_of_missing_sample_is_rejected() {
        let mut message = message(json!([{ "name": "mustSequence", "value": true }]));
        processor().validate_and_export(&mut message).await.unwrap();
        assert_eq!(message.stage(), MessageStage::Rejected);
        assert_eq!(message.errors().len(), 1);
    }
}
