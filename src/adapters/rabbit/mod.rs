//! RabbitMQ transport
//!
//! - [`state`] - transport state machine and transition table
//! - [`connection`] - AMQP URI and TLS settings
//! - [`consumer`] - lapin binding that drives the state machine
//! - [`publisher`] - feedback publishing with publisher confirms
//! - [`supervisor`] - reconnect loop on a dedicated thread

pub mod connection;
pub mod consumer;
pub mod publisher;
pub mod state;
pub mod supervisor;

pub use connection::ConnectionSettings;
pub use consumer::{
    reconnect_outcome, settle_failed, settle_outcome, DeliveryHandler, Headers, HealthProbe,
    RabbitConsumer, RunOutcome, Settlement,
};
pub use publisher::{FeedbackPublisher, InMemoryPublisher, OutboundMessage, RabbitPublisher};
pub use state::{ConnectionState, ReconnectSignal, TransportStateMachine};
pub use supervisor::{BackoffPolicy, Supervisor, SupervisorHandle, Transport, TransportFactory};
