//! Dispatcher
//!
//! The delivery handler behind the consumer. For each delivery it:
//!
//! 1. builds a [`RabbitMessage`] and decodes it
//! 2. re-raises transient decode failures, leaving the delivery unsettled
//! 3. dead-letters any other decode failure
//! 4. dead-letters unless exactly one record was decoded
//! 5. dead-letters subjects without a registered processor
//! 6. returns the processor's verdict, re-raising its transient failures
//!
//! Unhandled processor errors are logged and dead-lettered.

use super::envelope::RabbitMessage;
use super::registry::ProcessorRegistry;
use crate::adapters::rabbit::{DeliveryHandler, Headers};
use crate::adapters::schema_registry::SchemaCodec;
use crate::domain::errors::{ProcessingError, TransientError};
use async_trait::async_trait;
use std::sync::Arc;

/// Routes decoded messages to their processors
pub struct Dispatcher {
    codec: Arc<dyn SchemaCodec>,
    registry: ProcessorRegistry,
}

impl Dispatcher {
    pub fn new(codec: Arc<dyn SchemaCodec>, registry: ProcessorRegistry) -> Self {
        Self { codec, registry }
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Processes one delivery
    ///
    /// `Ok(true)` acks, `Ok(false)` dead-letters.
    ///
    /// # Errors
    ///
    /// Returns [`TransientError`] when the delivery must be retried.
    pub async fn process_message(
        &self,
        headers: &Headers,
        body: &[u8],
    ) -> Result<bool, TransientError> {
        let mut message = RabbitMessage::new(headers.clone(), body.to_vec());

        if let Err(e) = message.decode(self.codec.as_ref()).await {
            if e.is_transient() {
                tracing::warn!(error = %e, "Decode failed transiently, leaving delivery for retry");
                return Err(TransientError::new(e.to_string()));
            }
            tracing::error!(error = %e, headers = ?headers, "Message could not be decoded");
            return Ok(false);
        }

        // decode succeeded, so the subject header is present
        let subject = match message.subject() {
            Ok(subject) => subject,
            Err(e) => {
                tracing::error!(error = %e, "Message has no subject");
                return Ok(false);
            }
        };

        let count = message.records().map_or(0, |records| records.len());
        let Some(record) = message.into_single_record() else {
            tracing::error!(
                subject = %subject,
                records = count,
                "Expected exactly one record per message"
            );
            return Ok(false);
        };

        let Some(processor) = self.registry.get(subject.as_str()) else {
            tracing::error!(subject = %subject, "No processor registered for subject");
            return Ok(false);
        };

        match processor.process(record).await {
            Ok(accepted) => Ok(accepted),
            Err(ProcessingError::Transient(e)) => {
                tracing::warn!(subject = %subject, error = %e, "Processing failed transiently");
                Err(e)
            }
            Err(ProcessingError::Unhandled(reason)) => {
                tracing::error!(subject = %subject, error = %reason, "Unhandled processing error");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl DeliveryHandler for Dispatcher {
    async fn handle(&self, headers: &Headers, body: &[u8]) -> Result<bool, TransientError> {
        self.process_message(headers, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::schema_registry::JsonCodec;
    use crate::core::processors::DomainProcessor;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with a fixed outcome and counts calls
    struct FixedProcessor {
        calls: AtomicUsize,
        outcome: fn() -> Result<bool, ProcessingError>,
    }

    #[async_trait]
    impl DomainProcessor for FixedProcessor {
        async fn process(&self, _record: Value) -> Result<bool, ProcessingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn dispatcher(outcome: fn() -> Result<bool, ProcessingError>) -> (Dispatcher, Arc<FixedProcessor>, Arc<JsonCodec>) {
        let processor = Arc::new(FixedProcessor {
            calls: AtomicUsize::new(0),
            outcome,
        });
        let codec = Arc::new(JsonCodec::new(["create-plate", "orphan"]));
        let registry = ProcessorRegistry::new().register("create-plate", processor.clone());
        (Dispatcher::new(codec.clone(), registry), processor, codec)
    }

    fn headers(subject: &str) -> Headers {
        [
            ("subject", subject),
            ("schema-version", "1"),
            ("encoder-type", "json"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn test_single_record_reaches_processor() {
        let (dispatcher, processor, _) = dispatcher(|| Ok(true));
        let accepted = dispatcher
            .process_message(&headers("create-plate"), &body(json!({"a": 1})))
            .await
            .unwrap();
        assert!(accepted);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_or_many_records_are_dead_lettered() {
        let (dispatcher, processor, _) = dispatcher(|| Ok(true));
        for records in [json!([]), json!([{"a": 1}, {"a": 2}])] {
            let accepted = dispatcher
                .process_message(&headers("create-plate"), &body(records))
                .await
                .unwrap();
            assert!(!accepted);
        }
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subject_without_processor_is_dead_lettered() {
        let (dispatcher, _, _) = dispatcher(|| Ok(true));
        let accepted = dispatcher
            .process_message(&headers("orphan"), &body(json!({})))
            .await
            .unwrap();
        assert!(!accepted);
    }

    #[tokio::test]
    async fn test_malformed_messages_are_dead_lettered() {
        let (dispatcher, processor, _) = dispatcher(|| Ok(true));

        let unknown_schema = dispatcher
            .process_message(&headers("unknown"), &body(json!({})))
            .await
            .unwrap();
        let garbage = dispatcher
            .process_message(&headers("create-plate"), b"\x00\x01garbage")
            .await
            .unwrap();
        let mut no_version = headers("create-plate");
        no_version.remove("schema-version");
        let missing_header = dispatcher
            .process_message(&no_version, &body(json!({})))
            .await
            .unwrap();

        assert!(!unknown_schema && !garbage && !missing_header);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_codec_is_transient() {
        let (dispatcher, _, codec) = dispatcher(|| Ok(true));
        codec.set_unavailable(true);
        let result = dispatcher
            .process_message(&headers("create-plate"), &body(json!({})))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_processor_errors() {
        let (transient, _, _) =
            dispatcher(|| Err(TransientError::new("database down").into()));
        assert!(transient
            .process_message(&headers("create-plate"), &body(json!({})))
            .await
            .is_err());

        let (unhandled, _, _) =
            dispatcher(|| Err(ProcessingError::Unhandled("bug".to_string())));
        assert!(!unhandled
            .process_message(&headers("create-plate"), &body(json!({})))
            .await
            .unwrap());

        let (rejecting, _, _) = dispatcher(|| Ok(false));
        assert!(!rejecting
            .process_message(&headers("create-plate"), &body(json!({})))
            .await
            .unwrap());
    }
}
