//! Feedback errors and the outbound feedback message
//!
//! Every inbound domain message produces exactly one feedback message
//! describing what happened to it. The error codes are part of the wire
//! contract with downstream consumers and must never be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of feedback error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorTypeCode {
    UnhandledProcessingError = 1,
    ValidationCentreNotConfigured = 2,
    ValidationUnpopulatedField = 3,
    ValidationNonUniqueValue = 4,
    ValidationInvalidFormatValue = 5,
    ValidationOutOfRangeValue = 6,
    ExportingPlateAlreadyExists = 7,
    ExportingSampleAlreadyExists = 8,
    ExportingPostFeedback = 9,
}

impl ErrorTypeCode {
    /// Stable wire identifier
    pub fn type_id(self) -> i32 {
        self as i32
    }

    /// Looks a code up by its wire identifier
    pub fn from_type_id(type_id: i32) -> Option<Self> {
        use ErrorTypeCode::*;
        [
            UnhandledProcessingError,
            ValidationCentreNotConfigured,
            ValidationUnpopulatedField,
            ValidationNonUniqueValue,
            ValidationInvalidFormatValue,
            ValidationOutOfRangeValue,
            ExportingPlateAlreadyExists,
            ExportingSampleAlreadyExists,
            ExportingPostFeedback,
        ]
        .into_iter()
        .find(|code| code.type_id() == type_id)
    }
}

impl fmt::Display for ErrorTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.type_id())
    }
}

impl Serialize for ErrorTypeCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.type_id())
    }
}

impl<'de> Deserialize<'de> for ErrorTypeCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let type_id = i32::deserialize(deserializer)?;
        ErrorTypeCode::from_type_id(type_id)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error type id {type_id}")))
    }
}

/// A single problem found while processing a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackError {
    /// Error category
    #[serde(rename = "typeId")]
    pub error_type: ErrorTypeCode,

    /// Where the problem was found (e.g. `plate`, `sample`)
    pub origin: String,

    /// Sample the problem relates to, when it is sample-specific
    pub sample_uuid: Option<String>,

    /// Offending field, when one can be named
    pub field: Option<String>,

    /// Human-readable explanation
    pub description: String,
}

impl FeedbackError {
    /// Creates a new feedback error
    pub fn new(
        error_type: ErrorTypeCode,
        origin: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            origin: origin.into(),
            sample_uuid: None,
            field: None,
            description: description.into(),
        }
    }

    /// Sets the sample uuid
    pub fn with_sample_uuid(mut self, sample_uuid: impl Into<String>) -> Self {
        self.sample_uuid = Some(sample_uuid.into());
        self
    }

    /// Sets the field name
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for FeedbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.description, self.error_type)?;
        if let Some(field) = &self.field {
            write!(f, " field={field}")?;
        }
        if let Some(sample_uuid) = &self.sample_uuid {
            write!(f, " sample={sample_uuid}")?;
        }
        Ok(())
    }
}

/// Outcome of one exporter sub-step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub success: bool,
    pub error: Option<FeedbackError>,
}

impl ExportResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: FeedbackError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

/// Outbound message summarising the processing of one inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackMessage {
    pub source_message_uuid: String,
    pub count_of_total_samples: i32,
    pub count_of_valid_samples: i32,
    pub operation_was_error_free: bool,
    pub errors: Vec<FeedbackError>,
}

impl FeedbackMessage {
    /// Builds a feedback message; error-free is derived from the error list
    pub fn new(
        source_message_uuid: impl Into<String>,
        count_of_total_samples: usize,
        count_of_valid_samples: usize,
        errors: Vec<FeedbackError>,
    ) -> Self {
        Self {
            source_message_uuid: source_message_uuid.into(),
            count_of_total_samples: saturating_i32(count_of_total_samples),
            count_of_valid_samples: saturating_i32(count_of_valid_samples),
            operation_was_error_free: errors.is_empty(),
            errors,
        }
    }
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
