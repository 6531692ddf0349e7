//! Domain processors
//!
//! A processor turns one decoded record into validated domain state, hands
//! it to an exporter and publishes feedback. Its verdict follows one rule for
//! every subject:
//!
//! - validation problems are reported as feedback and the delivery is acked
//!   (`Ok(true)`)
//! - storage or broker failures are returned as [`ProcessingError::Transient`]
//!   and the delivery stays unsettled
//! - anything else is [`ProcessingError::Unhandled`]
//!
//! - [`validation`] - field rules and duplicate detection
//! - [`create_plate`] - `create-plate` messages
//! - [`update_sample`] - `update-sample` messages
//! - [`feedback`] - encoding and publishing of feedback messages

pub mod create_plate;
pub mod feedback;
pub mod update_sample;
pub mod validation;

pub use create_plate::{CreatePlateProcessor, CREATE_PLATE_SUBJECT};
pub use feedback::{FeedbackKind, FeedbackSender};
pub use update_sample::{UpdateSampleProcessor, UPDATE_SAMPLE_SUBJECT};

use crate::adapters::database::Storage;
use crate::config::ProcessingConfig;
use crate::domain::errors::ProcessingError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Handles the decoded record of one subject
#[async_trait]
pub trait DomainProcessor: Send + Sync {
    /// Processes one record
    ///
    /// `Ok(true)` acks the delivery, `Ok(false)` dead-letters it.
    async fn process(&self, record: Value) -> Result<bool, ProcessingError>;
}

/// Shared dependencies handed to every processor
#[derive(Clone)]
pub struct ProcessorContext {
    pub processing: ProcessingConfig,
    pub storage: Storage,
    pub feedback: Arc<FeedbackSender>,
}

/// Turns a record that does not fit the payload type into an unhandled error
pub(crate) fn parse_payload<T: serde::de::DeserializeOwned>(
    subject: &str,
    record: Value,
) -> Result<T, ProcessingError> {
    serde_json::from_value(record)
        .map_err(|e| ProcessingError::Unhandled(format!("{subject} record has an unexpected shape: {e}")))
}
