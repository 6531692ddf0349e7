//! Storage factory
//!
//! Builds the store, import log and mirror from configuration. The store and
//! the import log share one pool.

use crate::adapters::database::traits::{DocumentStore, ImportLog, NoopMirror, SampleMirror};
use crate::adapters::postgresql::{
    PostgreSQLClient, PostgreSQLImportLog, PostgreSQLMirror, PostgreSQLStore,
};
use crate::config::LabportConfig;
use crate::domain::Result;
use std::sync::Arc;

/// The storage components the exporter writes to
#[derive(Clone)]
pub struct Storage {
    pub store: Arc<dyn DocumentStore>,
    pub import_log: Arc<dyn ImportLog>,
    pub mirror: Arc<dyn SampleMirror>,
}

/// Create the storage components based on the configuration
///
/// When `ensure_schema` is set the migrations are run against the primary
/// database and, if configured, the mirror.
///
/// # Errors
///
/// Returns an error if a pool cannot be created or a migration fails.
pub async fn create_storage(config: &LabportConfig, ensure_schema: bool) -> Result<Storage> {
    tracing::info!("Creating PostgreSQL store");
    let client = Arc::new(PostgreSQLClient::new(config.database.clone())?);
    let store = PostgreSQLStore::new(client.clone());
    if ensure_schema {
        store.ensure_schema().await?;
    }

    let mirror: Arc<dyn SampleMirror> = match &config.mirror {
        Some(mirror_config) => {
            tracing::info!("Creating PostgreSQL sample mirror");
            let mirror = PostgreSQLMirror::new(Arc::new(PostgreSQLClient::new(
                mirror_config.clone(),
            )?));
            if ensure_schema {
                mirror.ensure_schema().await?;
            }
            Arc::new(mirror)
        }
        None => {
            tracing::debug!("No mirror database configured");
            Arc::new(NoopMirror)
        }
    };

    Ok(Storage {
        store: Arc::new(store),
        import_log: Arc::new(PostgreSQLImportLog::new(client)),
        mirror,
    })
}
