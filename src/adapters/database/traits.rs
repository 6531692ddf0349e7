//! Storage abstraction traits
//!
//! The exporter talks to storage only through these traits, so the pipeline
//! runs unchanged against PostgreSQL or the in-memory store.

use crate::domain::ids::PlateBarcode;
use crate::domain::plate::{ImportRecord, SampleDocument, SourcePlate};
use crate::domain::Result;
use async_trait::async_trait;

/// Transactional document store holding plates and samples
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a session with a transaction already started
    ///
    /// Each exported message uses its own session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn begin(&self) -> Result<Box<dyn StoreSession>>;

    /// Test the connection to the store
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Creates tables and indexes if they are missing
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    async fn ensure_schema(&self) -> Result<()>;
}

/// One open transaction
///
/// Writes become visible to other sessions only after [`StoreSession::commit`].
/// Dropping a session without committing discards its writes.
#[async_trait]
pub trait StoreSession: Send {
    /// Looks up a plate by its barcode
    async fn find_plate_by_barcode(&mut self, barcode: &PlateBarcode) -> Result<Option<SourcePlate>>;

    /// Inserts a new plate
    async fn insert_plate(&mut self, plate: &SourcePlate) -> Result<()>;

    /// Inserts a sample keyed by its uuid
    ///
    /// Returns `false` without writing when a sample with that uuid exists.
    async fn insert_sample(&mut self, sample: &SampleDocument) -> Result<bool>;

    /// Looks up a sample by uuid
    async fn find_sample(&mut self, uuid: &str) -> Result<Option<SampleDocument>>;

    /// Replaces a stored sample
    async fn update_sample(&mut self, sample: &SampleDocument) -> Result<()>;

    /// Commits the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rolls the transaction back
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Append-only audit log of import attempts
#[async_trait]
pub trait ImportLog: Send + Sync {
    /// Appends one record
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    async fn record(&self, record: &ImportRecord) -> Result<()>;
}

/// Secondary store receiving copies of accepted samples
#[async_trait]
pub trait SampleMirror: Send + Sync {
    /// Copies samples, replacing earlier copies with the same uuid
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    async fn mirror_samples(&self, samples: &[SampleDocument]) -> Result<()>;
}

/// Mirror used when no secondary store is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMirror;

#[async_trait]
impl SampleMirror for NoopMirror {
    async fn mirror_samples(&self, samples: &[SampleDocument]) -> Result<()> {
        tracing::debug!(count = samples.len(), "No mirror configured, skipping");
        Ok(())
    }
}
