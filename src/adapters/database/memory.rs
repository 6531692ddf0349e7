//! In-memory storage
//!
//! Transactional in-process implementations of the storage traits. Sessions
//! stage their writes and apply them on commit. Every component can be put
//! into a failing mode to exercise the error paths of the pipeline.

use super::traits::{DocumentStore, ImportLog, SampleMirror, StoreSession};
use crate::domain::ids::PlateBarcode;
use crate::domain::plate::{ImportRecord, SampleDocument, SourcePlate};
use crate::domain::{LabportError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Documents {
    plates: BTreeMap<String, SourcePlate>,
    samples: BTreeMap<String, SampleDocument>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| LabportError::Database("in-memory store lock poisoned".to_string()))
}

/// In-memory document store
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    documents: Arc<Mutex<Documents>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following operation fail like an unreachable database
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn plates(&self) -> Vec<SourcePlate> {
        self.documents
            .lock()
            .map(|d| d.plates.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn samples(&self) -> Vec<SampleDocument> {
        self.documents
            .lock()
            .map(|d| d.samples.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn sample(&self, uuid: &str) -> Option<SampleDocument> {
        self.documents
            .lock()
            .ok()
            .and_then(|d| d.samples.get(uuid).cloned())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LabportError::Database(
                "in-memory store is unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>> {
        self.check_available()?;
        Ok(Box::new(InMemorySession {
            store: self.clone(),
            plates: BTreeMap::new(),
            samples: BTreeMap::new(),
        }))
    }

    async fn test_connection(&self) -> Result<()> {
        self.check_available()
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.check_available()
    }
}

/// Session staging writes until commit
struct InMemorySession {
    store: InMemoryStore,
    plates: BTreeMap<String, SourcePlate>,
    samples: BTreeMap<String, SampleDocument>,
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn find_plate_by_barcode(&mut self, barcode: &PlateBarcode) -> Result<Option<SourcePlate>> {
        self.store.check_available()?;
        if let Some(plate) = self.plates.get(barcode.as_str()) {
            return Ok(Some(plate.clone()));
        }
        Ok(lock(&self.store.documents)?
            .plates
            .get(barcode.as_str())
            .cloned())
    }

    async fn insert_plate(&mut self, plate: &SourcePlate) -> Result<()> {
        self.store.check_available()?;
        let key = plate.barcode.as_str().to_string();
        let exists = self.plates.contains_key(&key)
            || lock(&self.store.documents)?.plates.contains_key(&key);
        if exists {
            return Err(LabportError::Database(format!(
                "duplicate plate barcode {key}"
            )));
        }
        self.plates.insert(key, plate.clone());
        Ok(())
    }

    async fn insert_sample(&mut self, sample: &SampleDocument) -> Result<bool> {
        self.store.check_available()?;
        let exists = self.samples.contains_key(&sample.uuid)
            || lock(&self.store.documents)?
                .samples
                .contains_key(&sample.uuid);
        if exists {
            return Ok(false);
        }
        self.samples.insert(sample.uuid.clone(), sample.clone());
        Ok(true)
    }

    async fn find_sample(&mut self, uuid: &str) -> Result<Option<SampleDocument>> {
        self.store.check_available()?;
        if let Some(sample) = self.samples.get(uuid) {
            return Ok(Some(sample.clone()));
        }
        Ok(lock(&self.store.documents)?.samples.get(uuid).cloned())
    }

    async fn update_sample(&mut self, sample: &SampleDocument) -> Result<()> {
        self.store.check_available()?;
        self.samples.insert(sample.uuid.clone(), sample.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.store.check_available()?;
        let mut documents = lock(&self.store.documents)?;
        documents.plates.extend(self.plates);
        documents.samples.extend(self.samples);
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// In-memory import log
#[derive(Debug, Default)]
pub struct InMemoryImportLog {
    records: Mutex<Vec<ImportRecord>>,
    failing: AtomicBool,
}

impl InMemoryImportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ImportRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImportLog for InMemoryImportLog {
    async fn record(&self, record: &ImportRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LabportError::Database("import log unavailable".to_string()));
        }
        lock(&self.records)?.push(record.clone());
        Ok(())
    }
}

/// In-memory sample mirror
#[derive(Debug, Default)]
pub struct InMemoryMirror {
    samples: Mutex<BTreeMap<String, SampleDocument>>,
    failing: AtomicBool,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn samples(&self) -> Vec<SampleDocument> {
        self.samples
            .lock()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SampleMirror for InMemoryMirror {
    async fn mirror_samples(&self, samples: &[SampleDocument]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LabportError::Database("mirror unavailable".to_string()));
        }
        let mut mirrored = lock(&self.samples)?;
        for sample in samples {
            mirrored.insert(sample.uuid.clone(), sample.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::PlateCoordinate;
    use chrono::Utc;

    fn plate() -> SourcePlate {
        SourcePlate::new(PlateBarcode::new("PLATE-1").unwrap(), "CPTD")
    }

    fn sample(uuid: &str, plate: &SourcePlate) -> SampleDocument {
        let now = Utc::now();
        SampleDocument {
            uuid: uuid.to_string(),
            root_sample_id: format!("R-{uuid}"),
            rna_id: format!("RNA-{uuid}"),
            cog_uk_id: None,
            plate_coordinate: PlateCoordinate::new("A1").unwrap(),
            plate_barcode: plate.barcode.clone(),
            source_plate_uuid: plate.uuid.clone(),
            lab_id: plate.lab_id.clone(),
            result: "positive".to_string(),
            tested_date: None,
            fit_to_pick: true,
            must_sequence: false,
            preferentially_sequence: false,
            message_uuid: "m-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_writes_visible_only_after_commit() {
        let store = InMemoryStore::new();
        let plate = plate();

        let mut session = store.begin().await.unwrap();
        session.insert_plate(&plate).await.unwrap();
        assert!(session.insert_sample(&sample("s-1", &plate)).await.unwrap());
        assert!(session
            .find_plate_by_barcode(&plate.barcode)
            .await
            .unwrap()
            .is_some());
        assert!(store.plates().is_empty());

        session.commit().await.unwrap();
        assert_eq!(store.plates().len(), 1);
        assert_eq!(store.samples().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_discards_writes() {
        let store = InMemoryStore::new();
        let plate = plate();

        let mut session = store.begin().await.unwrap();
        session.insert_plate(&plate).await.unwrap();
        session.abort().await.unwrap();

        assert!(store.plates().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_sample_is_reported_not_written() {
        let store = InMemoryStore::new();
        let plate = plate();

        let mut session = store.begin().await.unwrap();
        session.insert_plate(&plate).await.unwrap();
        assert!(session.insert_sample(&sample("s-1", &plate)).await.unwrap());
        assert!(!session.insert_sample(&sample("s-1", &plate)).await.unwrap());
        session.commit().await.unwrap();

        let mut second = store.begin().await.unwrap();
        assert!(!second.insert_sample(&sample("s-1", &plate)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(store.begin().await.is_err());
        assert!(store.test_connection().await.is_err());
    }

    #[tokio::test]
    async fn test_mirror_replaces_by_uuid() {
        let mirror = InMemoryMirror::new();
        let plate = plate();
        let mut doc = sample("s-1", &plate);
        mirror.mirror_samples(&[doc.clone()]).await.unwrap();
        doc.must_sequence = true;
        mirror.mirror_samples(&[doc]).await.unwrap();

        let mirrored = mirror.samples();
        assert_eq!(mirrored.len(), 1);
        assert!(mirrored[0].must_sequence);
    }

    #[tokio::test]
    async fn test_import_log_failing_mode() {
        let log = InMemoryImportLog::new();
        log.set_failing(true);
        let record = ImportRecord {
            centre: "Cambridge".to_string(),
            samples_inserted_count: 0,
            file_or_message_ref: "m-1".to_string(),
            error_summary: "No errors".to_string(),
            timestamp: Utc::now(),
        };
        assert!(log.record(&record).await.is_err());
        log.set_failing(false);
        log.record(&record).await.unwrap();
        assert_eq!(log.records().len(), 1);
    }
}
