// Labport - Lab sample message consumer
// Copyright (c) 2025 Labport Contributors
// Licensed under the MIT License

//! # Labport - lab sample message consumer
//!
//! Labport consumes plate and sample messages from a RabbitMQ queue, decodes
//! them against a schema registry, validates them, stores accepted samples in
//! PostgreSQL and publishes a feedback message for every message it handles.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Dispatch, validation, export and feedback
//! - [`adapters`] - RabbitMQ, schema registry and PostgreSQL integrations
//! - [`domain`] - Messages, documents, identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Delivery outcomes
//!
//! Every delivery ends in exactly one settlement:
//!
//! - **ack** when the message was processed, whether or not it carried
//!   validation errors (the producer learns about those from feedback)
//! - **reject** (dead-letter) when the body cannot be decoded or the message
//!   cannot be handled at all
//! - **nack with requeue** when a dependency such as the database, the schema
//!   registry or the feedback exchange is unavailable; the consumer then
//!   reconnects with backoff
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labport::config::load_config;
//! use labport::adapters::database::create_storage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("labport.toml")?;
//! let storage = create_storage(&config, true).await?;
//! storage.store.test_connection().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::LabportError`]; the pipeline distinguishes
//! [`domain::errors::TransientError`] (retry later) from
//! [`domain::errors::ProcessingError::Unhandled`] (dead-letter).

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
