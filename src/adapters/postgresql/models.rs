//! PostgreSQL row models
//!
//! Samples are stored as a JSONB `document` next to the columns used for
//! lookups; plates are plain columns.

use crate::domain::ids::PlateBarcode;
use crate::domain::plate::{SampleDocument, SourcePlate};
use crate::domain::{LabportError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;

/// Row of the `source_plates` table
#[derive(Debug, Clone)]
pub struct PlateRow {
    pub barcode: String,
    pub uuid: String,
    pub lab_id: String,
    pub created_at: DateTime<Utc>,
}

impl PlateRow {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            barcode: column(row, "barcode")?,
            uuid: column(row, "uuid")?,
            lab_id: column(row, "lab_id")?,
            created_at: column(row, "created_at")?,
        })
    }

    pub fn from_domain(plate: &SourcePlate) -> Self {
        Self {
            barcode: plate.barcode.as_str().to_string(),
            uuid: plate.uuid.clone(),
            lab_id: plate.lab_id.clone(),
            created_at: plate.created_at,
        }
    }

    pub fn into_domain(self) -> Result<SourcePlate> {
        Ok(SourcePlate {
            uuid: self.uuid,
            barcode: PlateBarcode::new(self.barcode).map_err(LabportError::Database)?,
            lab_id: self.lab_id,
            created_at: self.created_at,
        })
    }
}

/// Row of the `samples` and `mirrored_samples` tables
#[derive(Debug, Clone)]
pub struct SampleRow {
    pub uuid: String,
    pub source_plate_uuid: String,
    pub plate_barcode: String,
    pub lab_id: String,
    pub document: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SampleRow {
    pub fn from_domain(sample: &SampleDocument) -> Result<Self> {
        Ok(Self {
            uuid: sample.uuid.clone(),
            source_plate_uuid: sample.source_plate_uuid.clone(),
            plate_barcode: sample.plate_barcode.as_str().to_string(),
            lab_id: sample.lab_id.clone(),
            document: serde_json::to_value(sample)?,
            created_at: sample.created_at,
            updated_at: sample.updated_at,
        })
    }

    /// Rebuilds the domain document from the stored JSONB
    pub fn document_from_row(row: &Row) -> Result<SampleDocument> {
        let document: Value = column(row, "document")?;
        serde_json::from_value(document).map_err(|e| {
            LabportError::Database(format!("Stored sample document is unreadable: {e}"))
        })
    }
}

fn column<'a, T>(row: &'a Row, name: &str) -> Result<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name)
        .map_err(|e| LabportError::Database(format!("Failed to read column '{name}': {e}")))
}
