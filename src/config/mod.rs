//! Configuration management for Labport.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Labport uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `LABPORT_<SECTION>_<KEY>` overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use labport::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("labport.toml")?;
//!
//! println!("Queue: {}", config.rabbitmq.queue);
//! println!("Centres: {}", config.processing.centres.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and health reporting
//! - [`RabbitMqConfig`] - Broker connection and consumed queue
//! - [`FeedbackConfig`] - Feedback exchange and routing keys
//! - [`SchemaRegistryConfig`] - Schema registry endpoint
//! - [`ProcessingConfig`] - Configured centres
//! - [`PostgreSQLConfig`] - Document store and optional mirror
//! - [`ReconnectConfig`] - Reconnect backoff
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! environment = "production"
//!
//! [rabbitmq]
//! host = "rabbit.example.com"
//! port = 5671
//! username = "labport"
//! password = "${LABPORT_RABBITMQ_PASSWORD}"
//! use_ssl = true
//! queue = "heron.plates"
//!
//! [schema_registry]
//! base_url = "https://registry.example.com"
//! api_key = "${LABPORT_REGISTRY_KEY}"
//!
//! [processing]
//! centres = [{ lab_id = "CPTD", name = "Cambridge" }]
//!
//! [database]
//! connection_string = "${LABPORT_DATABASE_URL}"
//! ssl_mode = "require"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, CentreConfig, Environment, FeedbackConfig, LabportConfig, LoggingConfig,
    PostgreSQLConfig, ProcessingConfig, RabbitMqConfig, ReconnectConfig, SchemaRegistryConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
