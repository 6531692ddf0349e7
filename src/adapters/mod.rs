//! External system integrations for Labport.
//!
//! This module provides adapters for the systems the consumer talks to:
//!
//! - [`rabbit`] - RabbitMQ transport: state machine, consumer, publisher, supervisor
//! - [`schema_registry`] - Schema registry client and record codecs
//! - [`database`] - Storage abstraction layer (trait-based)
//! - [`postgresql`] - PostgreSQL implementation of the storage traits
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind traits
//! ([`rabbit::DeliveryHandler`], [`rabbit::FeedbackPublisher`],
//! [`schema_registry::SchemaCodec`], [`database::DocumentStore`]) so the whole
//! pipeline can run against in-memory implementations:
//!
//! ```rust
//! use labport::adapters::database::{DocumentStore, InMemoryStore};
//!
//! # async fn example() -> labport::domain::Result<()> {
//! let store = InMemoryStore::new();
//! let session = store.begin().await?;
//! session.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod postgresql;
pub mod rabbit;
pub mod schema_registry;
