//! Persisted laboratory entities
//!
//! These are the documents the exporter writes. They are built from validated
//! messages only.

use super::ids::{PlateBarcode, PlateCoordinate};
use super::messages::SamplePayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source plate document, keyed by barcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePlate {
    /// Generated once on first creation and reused thereafter
    pub uuid: String,
    pub barcode: PlateBarcode,
    pub lab_id: String,
    pub created_at: DateTime<Utc>,
}

impl SourcePlate {
    /// Creates a plate with a freshly generated uuid
    pub fn new(barcode: PlateBarcode, lab_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            barcode,
            lab_id: lab_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Sample document, keyed by the sample uuid carried in the message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDocument {
    pub uuid: String,
    pub root_sample_id: String,
    pub rna_id: String,
    pub cog_uk_id: Option<String>,
    pub plate_coordinate: PlateCoordinate,
    pub plate_barcode: PlateBarcode,
    pub source_plate_uuid: String,
    pub lab_id: String,
    pub result: String,
    pub tested_date: Option<DateTime<Utc>>,
    pub fit_to_pick: bool,
    pub must_sequence: bool,
    pub preferentially_sequence: bool,
    pub message_uuid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SampleDocument {
    /// Builds a document from a validated sample
    ///
    /// The coordinate has already been checked; an unparseable one is reported
    /// back as an error rather than stored.
    pub fn from_payload(
        sample: &SamplePayload,
        plate: &SourcePlate,
        message_uuid: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        Ok(Self {
            uuid: sample.sample_uuid.trim().to_string(),
            root_sample_id: sample.root_sample_id.trim().to_string(),
            rna_id: sample.rna_id.trim().to_string(),
            cog_uk_id: sample.cog_uk_id.clone(),
            plate_coordinate: PlateCoordinate::new(&sample.plate_coordinate)?,
            plate_barcode: plate.barcode.clone(),
            source_plate_uuid: plate.uuid.clone(),
            lab_id: plate.lab_id.clone(),
            result: sample.result.to_lowercase(),
            tested_date: sample.tested_date_utc,
            fit_to_pick: sample.fit_to_pick,
            must_sequence: sample.must_sequence,
            preferentially_sequence: sample.preferentially_sequence,
            message_uuid: message_uuid.to_string(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Fields a sample update may change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleUpdate {
    pub must_sequence: Option<bool>,
    pub preferentially_sequence: Option<bool>,
}

impl SampleUpdate {
    pub fn is_empty(&self) -> bool {
        self.must_sequence.is_none() && self.preferentially_sequence.is_none()
    }

    /// Applies the update to a stored document
    pub fn apply_to(&self, sample: &mut SampleDocument, now: DateTime<Utc>) {
        if let Some(value) = self.must_sequence {
            sample.must_sequence = value;
        }
        if let Some(value) = self.preferentially_sequence {
            sample.preferentially_sequence = value;
        }
        sample.updated_at = now;
    }
}

/// Append-only audit entry written after each export attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub centre: String,
    pub samples_inserted_count: usize,
    pub file_or_message_ref: String,
    pub error_summary: String,
    pub timestamp: DateTime<Utc>,
}
