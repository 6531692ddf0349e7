//! Core processing pipeline for Labport.
//!
//! # Modules
//!
//! - [`dispatch`] - Envelope decoding and routing by subject
//! - [`processors`] - Validation and feedback per subject
//! - [`export`] - Transactional, idempotent persistence
//!
//! # Pipeline
//!
//! For every delivery the consumer hands to the [`dispatch::Dispatcher`]:
//!
//! 1. **Decode**: resolve the schema from the `subject` and `schema-version`
//!    headers and decode the body into exactly one record
//! 2. **Route**: pick the processor registered for the subject
//! 3. **Validate**: record every field problem as a feedback error
//! 4. **Export**: write plate and samples in one transaction
//! 5. **Report**: publish a feedback message and ack
//!
//! # Example
//!
//! ```rust
//! use labport::adapters::database::{InMemoryImportLog, InMemoryMirror, InMemoryStore, Storage};
//! use labport::adapters::rabbit::InMemoryPublisher;
//! use labport::adapters::schema_registry::JsonCodec;
//! use labport::config::{CentreConfig, FeedbackConfig, ProcessingConfig};
//! use labport::core::dispatch::{Dispatcher, ProcessorRegistry};
//! use labport::core::processors::{FeedbackSender, ProcessorContext};
//! use std::sync::Arc;
//!
//! let codec = Arc::new(JsonCodec::new(["create-plate", "create-plate-feedback"]));
//! let feedback = FeedbackSender::new(
//!     codec.clone(),
//!     Arc::new(InMemoryPublisher::new()),
//!     FeedbackConfig::default(),
//! );
//! let context = ProcessorContext {
//!     processing: ProcessingConfig {
//!         centres: vec![CentreConfig { lab_id: "CPTD".into(), name: "Alderley".into() }],
//!     },
//!     storage: Storage {
//!         store: Arc::new(InMemoryStore::new()),
//!         import_log: Arc::new(InMemoryImportLog::new()),
//!         mirror: Arc::new(InMemoryMirror::new()),
//!     },
//!     feedback: Arc::new(feedback),
//! };
//! let dispatcher = Dispatcher::new(codec, ProcessorRegistry::standard(&context));
//! assert!(dispatcher.registry().get("create-plate").is_some());
//! ```

pub mod dispatch;
pub mod export;
pub mod processors;
