//! PostgreSQL storage integration
//!
//! Plates, samples and the import log live in the primary database; the
//! optional mirror database receives copies of accepted samples.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::{PostgreSQLImportLog, PostgreSQLMirror, PostgreSQLSession, PostgreSQLStore};
pub use client::{PostgreSQLClient, SchemaKind};
pub use models::{PlateRow, SampleRow};
