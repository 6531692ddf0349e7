//! Subject to processor table

use crate::core::processors::{
    CreatePlateProcessor, DomainProcessor, ProcessorContext, UpdateSampleProcessor,
    CREATE_PLATE_SUBJECT, UPDATE_SAMPLE_SUBJECT,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Processors keyed by message subject, built once at startup
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, Arc<dyn DomainProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `create-plate` and `update-sample` processors
    pub fn standard(context: &ProcessorContext) -> Self {
        Self::new()
            .register(
                CREATE_PLATE_SUBJECT,
                Arc::new(CreatePlateProcessor::new(context)),
            )
            .register(
                UPDATE_SAMPLE_SUBJECT,
                Arc::new(UpdateSampleProcessor::new(context)),
            )
    }

    /// Adds a processor, replacing any earlier one for the subject
    pub fn register(
        mut self,
        subject: impl Into<String>,
        processor: Arc<dyn DomainProcessor>,
    ) -> Self {
        self.processors.insert(subject.into(), processor);
        self
    }

    pub fn get(&self, subject: &str) -> Option<&Arc<dyn DomainProcessor>> {
        self.processors.get(subject)
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::{InMemoryImportLog, InMemoryMirror, InMemoryStore, Storage};
    use crate::adapters::rabbit::InMemoryPublisher;
    use crate::adapters::schema_registry::JsonCodec;
    use crate::config::{FeedbackConfig, ProcessingConfig};
    use crate::core::processors::FeedbackSender;
    use crate::domain::errors::ProcessingError;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Refuse;

    #[async_trait]
    impl DomainProcessor for Refuse {
        async fn process(&self, _record: Value) -> Result<bool, ProcessingError> {
            Ok(false)
        }
    }

    fn context() -> ProcessorContext {
        ProcessorContext {
            processing: ProcessingConfig { centres: Vec::new() },
            storage: Storage {
                store: Arc::new(InMemoryStore::new()),
                import_log: Arc::new(InMemoryImportLog::new()),
                mirror: Arc::new(InMemoryMirror::new()),
            },
            feedback: Arc::new(FeedbackSender::new(
                Arc::new(JsonCodec::new(Vec::<String>::new())),
                Arc::new(InMemoryPublisher::new()),
                FeedbackConfig::default(),
            )),
        }
    }

    #[test]
    fn test_standard_registry_subjects() {
        let registry = ProcessorRegistry::standard(&context());
        let subjects: Vec<&str> = registry.subjects().collect();
        assert_eq!(subjects, vec!["create-plate", "update-sample"]);
        assert!(registry.get("create-plate-feedback").is_none());
    }

    #[tokio::test]
    async fn test_register_replaces_existing_processor() {
        let registry =
            ProcessorRegistry::standard(&context()).register(CREATE_PLATE_SUBJECT, Arc::new(Refuse));

        let processor = registry.get(CREATE_PLATE_SUBJECT).unwrap();
        assert!(!processor.process(Value::Null).await.unwrap());
        assert_eq!(registry.subjects().count(), 2);
    }
}
