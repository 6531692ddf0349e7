//! PostgreSQL adapter implementing the storage traits
//!
//! A session checks one connection out of the pool, issues `BEGIN` and keeps
//! the connection until `COMMIT` or `ROLLBACK`. A session dropped while its
//! transaction is still open detaches the connection from the pool instead of
//! returning it, so the open transaction dies with the socket.

use crate::adapters::database::traits::{DocumentStore, ImportLog, SampleMirror, StoreSession};
use crate::adapters::postgresql::client::{PostgreSQLClient, SchemaKind};
use crate::adapters::postgresql::models::{PlateRow, SampleRow};
use crate::domain::ids::PlateBarcode;
use crate::domain::plate::{ImportRecord, SampleDocument, SourcePlate};
use crate::domain::{LabportError, Result};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Object;
use std::sync::Arc;

fn db_err(action: &str) -> impl Fn(tokio_postgres::Error) -> LabportError + '_ {
    move |e| LabportError::Database(format!("{action}: {e}"))
}

/// Primary document store
pub struct PostgreSQLStore {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLStore {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }
}

#[async_trait]
impl DocumentStore for PostgreSQLStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>> {
        let conn = self.client.get_connection().await?;
        conn.batch_execute("BEGIN")
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        Ok(Box::new(PostgreSQLSession { conn: Some(conn) }))
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema(SchemaKind::Primary).await
    }
}

/// One open transaction on a pooled connection
pub struct PostgreSQLSession {
    conn: Option<Object>,
}

impl PostgreSQLSession {
    fn conn(&self) -> Result<&Object> {
        self.conn
            .as_ref()
            .ok_or_else(|| LabportError::Database("Session already finished".to_string()))
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<()> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| LabportError::Database("Session already finished".to_string()))?;
        match conn.batch_execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // State unknown after a failed COMMIT/ROLLBACK
                drop(Object::take(conn));
                Err(LabportError::Database(format!("{statement} failed: {e}")))
            }
        }
    }
}

impl Drop for PostgreSQLSession {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Session dropped with an open transaction, discarding connection");
            drop(Object::take(conn));
        }
    }
}

#[async_trait]
impl StoreSession for PostgreSQLSession {
    async fn find_plate_by_barcode(&mut self, barcode: &PlateBarcode) -> Result<Option<SourcePlate>> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT barcode, uuid, lab_id, created_at FROM source_plates WHERE barcode = $1",
                &[&barcode.as_str()],
            )
            .await
            .map_err(db_err("Failed to look up plate"))?;

        row.map(|r| PlateRow::from_row(&r)?.into_domain()).transpose()
    }

    async fn insert_plate(&mut self, plate: &SourcePlate) -> Result<()> {
        let row = PlateRow::from_domain(plate);
        self.conn()?
            .execute(
                "INSERT INTO source_plates (barcode, uuid, lab_id, created_at) VALUES ($1, $2, $3, $4)",
                &[&row.barcode, &row.uuid, &row.lab_id, &row.created_at],
            )
            .await
            .map_err(db_err("Failed to insert plate"))?;
        Ok(())
    }

    async fn insert_sample(&mut self, sample: &SampleDocument) -> Result<bool> {
        let row = SampleRow::from_domain(sample)?;
        let inserted = self
            .conn()?
            .execute(
                "INSERT INTO samples \
                 (uuid, source_plate_uuid, plate_barcode, lab_id, document, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (uuid) DO NOTHING",
                &[
                    &row.uuid,
                    &row.source_plate_uuid,
                    &row.plate_barcode,
                    &row.lab_id,
                    &row.document,
                    &row.created_at,
                    &row.updated_at,
                ],
            )
            .await
            .map_err(db_err("Failed to insert sample"))?;
        Ok(inserted == 1)
    }

    async fn find_sample(&mut self, uuid: &str) -> Result<Option<SampleDocument>> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT document FROM samples WHERE uuid = $1 FOR UPDATE",
                &[&uuid],
            )
            .await
            .map_err(db_err("Failed to look up sample"))?;

        row.map(|r| SampleRow::document_from_row(&r)).transpose()
    }

    async fn update_sample(&mut self, sample: &SampleDocument) -> Result<()> {
        let row = SampleRow::from_domain(sample)?;
        let updated = self
            .conn()?
            .execute(
                "UPDATE samples SET document = $2, updated_at = $3 WHERE uuid = $1",
                &[&row.uuid, &row.document, &row.updated_at],
            )
            .await
            .map_err(db_err("Failed to update sample"))?;

        if updated == 0 {
            return Err(LabportError::Database(format!(
                "Sample {} vanished during update",
                sample.uuid
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

/// Import audit log in the `imports` table of the primary store
pub struct PostgreSQLImportLog {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLImportLog {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImportLog for PostgreSQLImportLog {
    async fn record(&self, record: &ImportRecord) -> Result<()> {
        let count = i64::try_from(record.samples_inserted_count).unwrap_or(i64::MAX);
        self.client
            .get_connection()
            .await?
            .execute(
                "INSERT INTO imports \
                 (centre, samples_inserted_count, file_or_message_ref, error_summary, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &record.centre,
                    &count,
                    &record.file_or_message_ref,
                    &record.error_summary,
                    &record.timestamp,
                ],
            )
            .await
            .map_err(db_err("Failed to write import record"))?;
        Ok(())
    }
}

/// Sample mirror in a secondary database
pub struct PostgreSQLMirror {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLMirror {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    /// Creates the mirror table if it is missing
    pub async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema(SchemaKind::Mirror).await
    }
}

#[async_trait]
impl SampleMirror for PostgreSQLMirror {
    async fn mirror_samples(&self, samples: &[SampleDocument]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut conn = self.client.get_connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(db_err("Failed to begin mirror transaction"))?;
        let mirrored_at = Utc::now();

        for sample in samples {
            let row = SampleRow::from_domain(sample)?;
            tx.execute(
                "INSERT INTO mirrored_samples (uuid, document, mirrored_at) VALUES ($1, $2, $3) \
                 ON CONFLICT (uuid) DO UPDATE \
                 SET document = EXCLUDED.document, mirrored_at = EXCLUDED.mirrored_at",
                &[&row.uuid, &row.document, &mirrored_at],
            )
            .await
            .map_err(db_err("Failed to mirror sample"))?;
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit mirror transaction"))?;
        tracing::debug!(count = samples.len(), "Samples mirrored");
        Ok(())
    }
}
