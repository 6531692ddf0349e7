//! Decoded domain messages
//!
//! A [`DomainMessage`] wraps the payload decoded from one broker delivery and
//! accumulates the feedback errors found while processing it. It lives for a
//! single processing pass and is never reused across deliveries.

use super::feedback::FeedbackError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Number of textual errors rendered in a summary
pub const SUMMARY_DISPLAY_LIMIT: usize = 5;

/// Processing stage of a domain message
///
/// Stages only move forward: received, validated, then exported or rejected.
/// A stage cannot be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageStage {
    Received,
    Validated,
    Exported,
    Rejected,
}

/// Append-only error list with parallel human-readable lines
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    errors: Vec<FeedbackError>,
    textual: Vec<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error and its textual form
    pub fn add(&mut self, error: FeedbackError) {
        tracing::warn!(
            type_id = error.error_type.type_id(),
            origin = %error.origin,
            field = error.field.as_deref().unwrap_or(""),
            sample_uuid = error.sample_uuid.as_deref().unwrap_or(""),
            "{}",
            error.description
        );
        self.textual.push(error.to_string());
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[FeedbackError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether any error is attached to the given sample
    pub fn has_sample_error(&self, sample_uuid: &str) -> bool {
        self.errors
            .iter()
            .any(|e| e.sample_uuid.as_deref() == Some(sample_uuid))
    }

    /// Whether any error applies to the message as a whole
    pub fn has_message_level_error(&self) -> bool {
        self.errors.iter().any(|e| e.sample_uuid.is_none())
    }

    /// Summary with a count header followed by the first few errors
    pub fn summary(&self) -> String {
        if self.textual.is_empty() {
            return "No errors".to_string();
        }

        let mut lines = vec![format!("Total number of errors: {}", self.textual.len())];
        lines.extend(
            self.textual
                .iter()
                .take(SUMMARY_DISPLAY_LIMIT)
                .cloned(),
        );
        if self.textual.len() > SUMMARY_DISPLAY_LIMIT {
            lines.push(format!(
                "... and {} more",
                self.textual.len() - SUMMARY_DISPLAY_LIMIT
            ));
        }
        lines.join("\n")
    }
}

/// One decoded message plus its processing state
#[derive(Debug, Clone)]
pub struct DomainMessage<P> {
    pub payload: P,
    errors: ErrorLog,
    stage: MessageStage,
}

impl<P> DomainMessage<P> {
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            errors: ErrorLog::new(),
            stage: MessageStage::Received,
        }
    }

    pub fn add_error(&mut self, error: FeedbackError) {
        self.errors.add(error);
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn stage(&self) -> MessageStage {
        self.stage
    }

    pub fn mark_validated(&mut self) {
        self.advance(MessageStage::Validated);
    }

    pub fn mark_exported(&mut self) {
        self.advance(MessageStage::Exported);
    }

    pub fn mark_rejected(&mut self) {
        self.advance(MessageStage::Rejected);
    }

    /// Received moves only to validated, validated only to exported or rejected
    fn advance(&mut self, next: MessageStage) {
        let allowed = matches!(
            (self.stage, next),
            (MessageStage::Received, MessageStage::Validated)
                | (MessageStage::Validated, MessageStage::Exported)
                | (MessageStage::Validated, MessageStage::Rejected)
        );
        if allowed {
            self.stage = next;
        } else {
            tracing::debug!(from = ?self.stage, to = ?next, "Ignoring out-of-order stage change");
        }
    }
}

/// `create-plate` record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlatePayload {
    pub message_uuid: String,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub message_create_date_utc: DateTime<Utc>,
    pub plate: PlatePayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatePayload {
    #[serde(default, deserialize_with = "trimmed")]
    pub lab_id: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub plate_barcode: String,
    #[serde(default)]
    pub samples: Vec<SamplePayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePayload {
    #[serde(default, deserialize_with = "trimmed")]
    pub sample_uuid: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub root_sample_id: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub rna_id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    pub cog_uk_id: Option<String>,
    #[serde(default)]
    pub plate_coordinate: String,
    #[serde(default)]
    pub result: String,
    #[serde(default, deserialize_with = "flexible_timestamp_opt")]
    pub tested_date_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fit_to_pick: bool,
    #[serde(default)]
    pub must_sequence: bool,
    #[serde(default)]
    pub preferentially_sequence: bool,
}

/// `update-sample` record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSamplePayload {
    pub message_uuid: String,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub message_create_date_utc: DateTime<Utc>,
    pub sample: SampleUpdatePayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleUpdatePayload {
    #[serde(default, deserialize_with = "trimmed")]
    pub sample_uuid: String,
    #[serde(default)]
    pub updated_fields: Vec<UpdatedField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatedField {
    pub name: String,
    pub value: serde_json::Value,
}

pub type CreatePlateMessage = DomainMessage<CreatePlatePayload>;
pub type UpdateSampleMessage = DomainMessage<UpdateSamplePayload>;

/// Identifiers are keys in storage and feedback, so surrounding whitespace is dropped
fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// Blank optional identifiers become `None`
fn trimmed_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// Avro `timestamp-millis` arrives as an integer, JSON-encoded bodies carry RFC 3339
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    fn into_datetime(self) -> Result<DateTime<Utc>, String> {
        match self {
            RawTimestamp::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| format!("timestamp {ms} out of range")),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("invalid timestamp '{text}': {e}")),
        }
    }
}

fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    RawTimestamp::deserialize(deserializer)?
        .into_datetime()
        .map_err(serde::de::Error::custom)
}

fn flexible_timestamp_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawTimestamp>::deserialize(deserializer)?
        .map(RawTimestamp::into_datetime)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feedback::ErrorTypeCode;
    use serde_json::json;

    fn error(n: usize) -> FeedbackError {
        FeedbackError::new(
            ErrorTypeCode::ValidationUnpopulatedField,
            "sample",
            format!("problem {n}"),
        )
    }

    #[test]
    fn test_summary_caps_displayed_errors() {
        let mut log = ErrorLog::new();
        for n in 0..7 {
            log.add(error(n));
        }

        let summary = log.summary();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Total number of errors: 7");
        assert!(lines[1].starts_with("problem 0"));
        assert!(lines[5].starts_with("problem 4"));
        assert_eq!(lines[6], "... and 2 more");
        assert!(!summary.contains("problem 5"));
    }

    #[test]
    fn test_summary_without_errors() {
        assert_eq!(ErrorLog::new().summary(), "No errors");
    }

    #[test]
    fn test_stage_only_moves_forward() {
        let mut message = DomainMessage::new(());
        assert_eq!(message.stage(), MessageStage::Received);
        message.mark_validated();
        assert_eq!(message.stage(), MessageStage::Validated);
        message.mark_rejected();
        assert_eq!(message.stage(), MessageStage::Rejected);
        message.mark_exported();
        assert_eq!(message.stage(), MessageStage::Rejected);
    }

    #[test]
    fn test_stage_cannot_skip_validation() {
        let mut message = DomainMessage::new(());
        message.mark_rejected();
        assert_eq!(message.stage(), MessageStage::Received);
        message.mark_exported();
        assert_eq!(message.stage(), MessageStage::Received);
    }

    #[test]
    fn test_sample_level_error_lookup() {
        let mut log = ErrorLog::new();
        log.add(error(1).with_sample_uuid("s-1"));
        assert!(log.has_sample_error("s-1"));
        assert!(!log.has_sample_error("s-2"));
        assert!(!log.has_message_level_error());
    }

    #[test]
    fn test_create_plate_payload_accepts_millis_and_rfc3339() {
        let payload: CreatePlatePayload = serde_json::from_value(json!({
            "messageUuid": "m-1",
            "messageCreateDateUtc": 1_600_000_000_000i64,
            "plate": {
                "labId": "CPTD",
                "plateBarcode": "PLATE-1",
                "samples": [{
                    "sampleUuid": "s-1",
                    "rootSampleId": "R1",
                    "rnaId": "PLATE-1_A01",
                    "plateCoordinate": "A1",
                    "result": "positive",
                    "testedDateUtc": "2020-09-01T10:00:00Z"
                }]
            }
        }))
        .unwrap();

        assert_eq!(payload.message_create_date_utc.timestamp(), 1_600_000_000);
        let sample = &payload.plate.samples[0];
        assert!(sample.tested_date_utc.is_some());
        assert!(sample.cog_uk_id.is_none());
        assert!(!sample.must_sequence);
    }

    #[test]
    fn test_identifiers_are_trimmed() {
        let payload: CreatePlatePayload = serde_json::from_value(json!({
            "messageUuid": "m-1",
            "messageCreateDateUtc": "2021-01-01T00:00:00Z",
            "plate": {
                "labId": " CPTD ",
                "plateBarcode": "PLATE-1 ",
                "samples": [{
                    "sampleUuid": " s-1 ",
                    "rootSampleId": "R1\t",
                    "rnaId": " PLATE-1_A01",
                    "cogUkId": "   "
                }]
            }
        }))
        .unwrap();

        assert_eq!(payload.plate.lab_id, "CPTD");
        assert_eq!(payload.plate.plate_barcode, "PLATE-1");
        let sample = &payload.plate.samples[0];
        assert_eq!(sample.sample_uuid, "s-1");
        assert_eq!(sample.root_sample_id, "R1");
        assert_eq!(sample.rna_id, "PLATE-1_A01");
        assert!(sample.cog_uk_id.is_none());

        let update: UpdateSamplePayload = serde_json::from_value(json!({
            "messageUuid": "m-2",
            "messageCreateDateUtc": "2021-01-01T00:00:00Z",
            "sample": { "sampleUuid": "s-1  ", "updatedFields": [] }
        }))
        .unwrap();
        assert_eq!(update.sample.sample_uuid, "s-1");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let payload: CreatePlatePayload = serde_json::from_value(json!({
            "messageUuid": "m-1",
            "messageCreateDateUtc": "2021-01-01T00:00:00Z",
            "plate": { "samples": [{}] }
        }))
        .unwrap();

        assert!(payload.plate.lab_id.is_empty());
        assert!(payload.plate.samples[0].root_sample_id.is_empty());
        assert!(payload.plate.samples[0].tested_date_utc.is_none());
    }
}
