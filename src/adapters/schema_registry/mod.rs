//! Schema registry integration
//!
//! - [`traits`] - the [`SchemaCodec`] seam used by the dispatcher and feedback sender
//! - [`client`] - HTTP client for the registry, with a per-version cache
//! - [`codec`] - Avro codec over the registry, plus a JSON codec for tests

pub mod client;
pub mod codec;
pub mod traits;

pub use client::{RegisteredSchema, SchemaRegistryClient};
pub use codec::{JsonCodec, RegistryCodec};
pub use traits::{Encoding, SchemaCodec};
