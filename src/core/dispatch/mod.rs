//! Envelope decoding and per-subject dispatch
//!
//! - [`envelope`] - [`RabbitMessage`], the decoded view of one delivery
//! - [`registry`] - [`ProcessorRegistry`], subject to processor table
//! - [`dispatcher`] - [`Dispatcher`], the consumer's delivery handler

pub mod dispatcher;
pub mod envelope;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use envelope::RabbitMessage;
pub use registry::ProcessorRegistry;
