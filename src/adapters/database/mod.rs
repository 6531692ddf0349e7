//! Storage abstraction layer
//!
//! Trait seams for the document store, the import log and the sample mirror,
//! with PostgreSQL and in-memory implementations behind them.

pub mod factory;
pub mod memory;
pub mod traits;

pub use factory::{create_storage, Storage};
pub use memory::{InMemoryImportLog, InMemoryMirror, InMemoryStore};
pub use traits::{DocumentStore, ImportLog, NoopMirror, SampleMirror, StoreSession};
