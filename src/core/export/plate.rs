//! Plate exporter
//!
//! Writes a validated plate and its samples in one transaction:
//!
//! 1. Resolve the plate by barcode: create it, reuse it when the lab matches,
//!    or record `ExportingPlateAlreadyExists` and write nothing.
//! 2. Insert each sample; an existing sample uuid is recorded as
//!    `ExportingSampleAlreadyExists` and the rest continue.
//! 3. Commit when the plate step succeeded.
//! 4. Best-effort: append an import record and mirror the inserted samples.
//!
//! Store failures during steps 1 to 3 roll back and surface as
//! [`TransientError`] so the delivery is retried.

use crate::adapters::database::{Storage, StoreSession};
use crate::core::processors::validation::{PLATE_ORIGIN, SAMPLE_ORIGIN};
use crate::domain::errors::{LabportError, TransientError};
use crate::domain::feedback::{ErrorTypeCode, ExportResult, FeedbackError};
use crate::domain::ids::PlateBarcode;
use crate::domain::messages::CreatePlateMessage;
use crate::domain::plate::{ImportRecord, SampleDocument, SourcePlate};
use crate::domain::Result;
use chrono::Utc;

/// What a plate export wrote
#[derive(Debug, Clone, Default)]
pub struct PlateExport {
    /// The plate the samples belong to, `None` after a plate conflict
    pub plate: Option<SourcePlate>,
    /// Samples inserted by this export
    pub inserted: Vec<SampleDocument>,
}

impl PlateExport {
    pub fn committed(&self) -> bool {
        self.plate.is_some()
    }
}

/// Wraps a primary store failure for retry
pub(crate) fn store_failure(action: &str, error: LabportError) -> TransientError {
    crate::log_error_with_context!(&error, action);
    TransientError::new(format!("{action}: {error}"))
}

pub(crate) async fn abort_quietly(session: Box<dyn StoreSession>) {
    if let Err(e) = session.abort().await {
        tracing::warn!(error = %e, "Rollback failed");
    }
}

/// Transactional, idempotent writer for `create-plate` messages
pub struct PlateExporter {
    storage: Storage,
}

impl PlateExporter {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Exports a validated message, recording conflicts on it
    ///
    /// # Errors
    ///
    /// Returns [`TransientError`] when the primary store fails; nothing has
    /// been committed in that case.
    pub async fn export(
        &self,
        message: &mut CreatePlateMessage,
        barcode: &PlateBarcode,
        centre: &str,
    ) -> std::result::Result<PlateExport, TransientError> {
        let mut session = self
            .storage
            .store
            .begin()
            .await
            .map_err(|e| store_failure("Failed to open storage session", e))?;

        let export = match self.write(session.as_mut(), message, barcode).await {
            Ok(export) => export,
            Err(e) => {
                abort_quietly(session).await;
                return Err(store_failure("Failed to write plate", e));
            }
        };

        if export.committed() {
            session
                .commit()
                .await
                .map_err(|e| store_failure("Failed to commit plate", e))?;
            tracing::info!(
                plate_barcode = %barcode,
                inserted = export.inserted.len(),
                "Plate exported"
            );
        } else {
            abort_quietly(session).await;
        }

        self.record_import(message, centre, export.inserted.len())
            .await;
        self.mirror(&export.inserted).await;
        Ok(export)
    }

    async fn write(
        &self,
        session: &mut dyn StoreSession,
        message: &mut CreatePlateMessage,
        barcode: &PlateBarcode,
    ) -> Result<PlateExport> {
        let (result, plate) =
            resolve_plate(session, barcode, &message.payload.plate.lab_id).await?;
        let Some(plate) = plate else {
            if let Some(error) = result.error {
                message.add_error(error);
            }
            return Ok(PlateExport::default());
        };

        let now = Utc::now();
        let mut inserted = Vec::new();
        let mut failures = Vec::new();
        for sample in &message.payload.plate.samples {
            let document = match SampleDocument::from_payload(
                sample,
                &plate,
                &message.payload.message_uuid,
                now,
            ) {
                Ok(document) => document,
                Err(e) => {
                    failures.push(
                        FeedbackError::new(
                            ErrorTypeCode::ValidationInvalidFormatValue,
                            SAMPLE_ORIGIN,
                            e,
                        )
                        .with_sample_uuid(sample.sample_uuid.trim())
                        .with_field("plateCoordinate"),
                    );
                    continue;
                }
            };

            let result = insert_sample(session, &document).await?;
            match result.error {
                None => inserted.push(document),
                Some(error) => failures.push(error),
            }
        }

        for error in failures {
            message.add_error(error);
        }
        Ok(PlateExport {
            plate: Some(plate),
            inserted,
        })
    }

    async fn record_import(&self, message: &CreatePlateMessage, centre: &str, inserted: usize) {
        let record = ImportRecord {
            centre: centre.to_string(),
            samples_inserted_count: inserted,
            file_or_message_ref: message.payload.message_uuid.clone(),
            error_summary: message.errors().summary(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.storage.import_log.record(&record).await {
            crate::log_error_with_context!(&e, "Failed to write import record");
        }
    }

    async fn mirror(&self, samples: &[SampleDocument]) {
        if samples.is_empty() {
            return;
        }
        if let Err(e) = self.storage.mirror.mirror_samples(samples).await {
            crate::log_error_with_context!(&e, "Failed to mirror samples");
        }
    }
}

/// Step 1: find, create or reject the plate
async fn resolve_plate(
    session: &mut dyn StoreSession,
    barcode: &PlateBarcode,
    lab_id: &str,
) -> Result<(ExportResult, Option<SourcePlate>)> {
    let lab_id = lab_id.trim();
    match session.find_plate_by_barcode(barcode).await? {
        None => {
            let plate = SourcePlate::new(barcode.clone(), lab_id);
            session.insert_plate(&plate).await?;
            tracing::debug!(plate_barcode = %barcode, plate_uuid = %plate.uuid, "Plate created");
            Ok((ExportResult::ok(), Some(plate)))
        }
        Some(plate) if plate.lab_id == lab_id => {
            tracing::debug!(plate_barcode = %barcode, plate_uuid = %plate.uuid, "Plate reused");
            Ok((ExportResult::ok(), Some(plate)))
        }
        Some(plate) => Ok((
            ExportResult::failed(
                FeedbackError::new(
                    ErrorTypeCode::ExportingPlateAlreadyExists,
                    PLATE_ORIGIN,
                    format!(
                        "Plate {barcode} already exists for lab '{}', not '{lab_id}'",
                        plate.lab_id
                    ),
                )
                .with_field("plateBarcode"),
            ),
            None,
        )),
    }
}

/// Step 2: insert one sample, reporting an existing uuid as a conflict
async fn insert_sample(
    session: &mut dyn StoreSession,
    document: &SampleDocument,
) -> Result<ExportResult> {
    if session.insert_sample(document).await? {
        return Ok(ExportResult::ok());
    }
    Ok(ExportResult::failed(
        FeedbackError::new(
            ErrorTypeCode::ExportingSampleAlreadyExists,
            SAMPLE_ORIGIN,
            format!("Sample {} already exists", document.uuid),
        )
        .with_sample_uuid(document.uuid.as_str())
        .with_field("sampleUuid"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::{InMemoryImportLog, InMemoryMirror, InMemoryStore};
    use crate::domain::messages::{CreatePlatePayload, DomainMessage, PlatePayload, SamplePayload};
    use std::sync::Arc;

    struct Fixture {
        store: InMemoryStore,
        import_log: Arc<InMemoryImportLog>,
        mirror: Arc<InMemoryMirror>,
        exporter: PlateExporter,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let import_log = Arc::new(InMemoryImportLog::new());
        let mirror = Arc::new(InMemoryMirror::new());
        let exporter = PlateExporter::new(Storage {
            store: Arc::new(store.clone()),
            import_log: import_log.clone(),
            mirror: mirror.clone(),
        });
        Fixture {
            store,
            import_log,
            mirror,
            exporter,
        }
    }

    fn message(lab_id: &str, sample_uuids: &[&str]) -> CreatePlateMessage {
        let samples = sample_uuids
            .iter()
            .enumerate()
            .map(|(i, uuid)| SamplePayload {
                sample_uuid: uuid.to_string(),
                root_sample_id: format!("R{i}"),
                rna_id: format!("RNA{i}"),
                cog_uk_id: None,
                plate_coordinate: format!("B{}", i + 1),
                result: "negative".to_string(),
                tested_date_utc: None,
                fit_to_pick: true,
                must_sequence: false,
                preferentially_sequence: false,
            })
            .collect();
        DomainMessage::new(CreatePlatePayload {
            message_uuid: "m-1".to_string(),
            message_create_date_utc: Utc::now(),
            plate: PlatePayload {
                lab_id: lab_id.to_string(),
                plate_barcode: "PLATE-7".to_string(),
                samples,
            },
        })
    }

    fn barcode() -> PlateBarcode {
        PlateBarcode::new("PLATE-7").unwrap()
    }

    #[tokio::test]
    async fn test_export_writes_plate_samples_and_audit() {
        let f = fixture();
        let mut msg = message("CPTD", &["s-1", "s-2"]);

        let export = f.exporter.export(&mut msg, &barcode(), "Alderley").await.unwrap();

        assert!(export.committed());
        assert_eq!(export.inserted.len(), 2);
        assert!(msg.errors().is_empty());
        assert_eq!(f.store.plates().len(), 1);
        assert_eq!(f.store.samples().len(), 2);
        assert_eq!(f.mirror.samples().len(), 2);

        let records = f.import_log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].centre, "Alderley");
        assert_eq!(records[0].samples_inserted_count, 2);
        assert_eq!(records[0].error_summary, "No errors");
    }

    #[tokio::test]
    async fn test_existing_plate_is_reused() {
        let f = fixture();
        let first = f
            .exporter
            .export(&mut message("CPTD", &["s-1"]), &barcode(), "Alderley")
            .await
            .unwrap();
        let second = f
            .exporter
            .export(&mut message("CPTD", &["s-2"]), &barcode(), "Alderley")
            .await
            .unwrap();

        assert_eq!(first.plate.unwrap().uuid, second.plate.unwrap().uuid);
        assert_eq!(f.store.plates().len(), 1);
        assert_eq!(f.store.samples().len(), 2);
    }

    #[tokio::test]
    async fn test_lab_mismatch_writes_nothing() {
        let f = fixture();
        f.exporter
            .export(&mut message("CPTD", &["s-1"]), &barcode(), "Alderley")
            .await
            .unwrap();

        let mut conflicting = message("MILK", &["s-9"]);
        let export = f
            .exporter
            .export(&mut conflicting, &barcode(), "Milton Keynes")
            .await
            .unwrap();

        assert!(!export.committed());
        assert!(f.store.sample("s-9").is_none());
        let errors = conflicting.errors().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ErrorTypeCode::ExportingPlateAlreadyExists);
        assert_eq!(f.import_log.records().len(), 2);
    }

    #[tokio::test]
    async fn test_sample_conflicts_do_not_stop_the_rest() {
        let f = fixture();
        f.exporter
            .export(&mut message("CPTD", &["s-1"]), &barcode(), "Alderley")
            .await
            .unwrap();

        let mut msg = message("CPTD", &["s-1", "s-2"]);
        let export = f.exporter.export(&mut msg, &barcode(), "Alderley").await.unwrap();

        assert!(export.committed());
        assert_eq!(export.inserted.len(), 1);
        assert!(msg.errors().has_sample_error("s-1"));
        assert_eq!(
            msg.errors().errors()[0].error_type,
            ErrorTypeCode::ExportingSampleAlreadyExists
        );
        assert_eq!(f.store.samples().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_transient() {
        let f = fixture();
        f.store.set_unavailable(true);
        let result = f
            .exporter
            .export(&mut message("CPTD", &["s-1"]), &barcode(), "Alderley")
            .await;
        assert!(result.is_err());
        assert!(f.import_log.records().is_empty());
    }

    #[tokio::test]
    async fn test_audit_and_mirror_failures_are_swallowed() {
        let f = fixture();
        f.import_log.set_failing(true);
        f.mirror.set_failing(true);

        let export = f
            .exporter
            .export(&mut message("CPTD", &["s-1"]), &barcode(), "Alderley")
            .await
            .unwrap();

        assert!(export.committed());
        assert_eq!(f.store.samples().len(), 1);
        assert!(f.mirror.samples().is_empty());
    }
}
