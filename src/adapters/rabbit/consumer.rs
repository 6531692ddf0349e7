//! lapin binding for the transport state machine
//!
//! [`RabbitConsumer`] performs the broker operations for one connection
//! attempt and reports every outcome to its [`TransportStateMachine`].
//! Deliveries are handed to a [`DeliveryHandler`] one at a time (prefetch 1)
//! and settled according to its verdict.

use super::connection::ConnectionSettings;
use super::state::{ConnectionState, ReconnectSignal, TransportStateMachine};
use crate::domain::errors::{BrokerError, TransientError};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// One in-flight message per consumer
pub const PREFETCH_COUNT: u16 = 1;

/// AMQP reply code for a normal close
const REPLY_SUCCESS: u16 = 200;

/// Transport headers as text, keyed by header name
pub type Headers = BTreeMap<String, String>;

/// Processing callback invoked once per delivery
///
/// `Ok(true)` acks, `Ok(false)` dead-letters, and `Err` leaves the delivery
/// unsettled so that the broker redelivers it after a reconnect.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, headers: &Headers, body: &[u8]) -> Result<bool, TransientError>;
}

/// How a delivery is settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    /// Negative acknowledgement without requeue
    DeadLetter,
}

impl Settlement {
    pub fn from_verdict(accepted: bool) -> Self {
        if accepted {
            Settlement::Ack
        } else {
            Settlement::DeadLetter
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Settlement::Ack => "ack",
            Settlement::DeadLetter => "dead-letter",
        }
    }
}

/// Shared liveness flag, written by the consumer and read by the host
#[derive(Debug, Clone, Default)]
pub struct HealthProbe(Arc<AtomicBool>);

impl HealthProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, healthy: bool) {
        self.0.store(healthy, Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a consumer run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested
    Shutdown,
    /// The connection was lost or processing failed transiently
    Reconnect(ReconnectSignal),
}

/// Decides how a handled delivery is settled
///
/// A transient failure records a reconnect on the machine and leaves the
/// delivery unsettled for redelivery.
pub fn settle_outcome(
    machine: &mut TransportStateMachine,
    verdict: Result<bool, TransientError>,
) -> Result<Settlement, RunOutcome> {
    match verdict {
        Ok(accepted) => Ok(Settlement::from_verdict(accepted)),
        Err(e) => {
            machine.on_processing_failed(&e.to_string());
            Err(reconnect_outcome(machine))
        }
    }
}

/// An ack or nack that never reached the broker closes the channel
pub fn settle_failed(
    machine: &mut TransportStateMachine,
    delivery_tag: u64,
    reason: &str,
) -> RunOutcome {
    let error = BrokerError::SettleFailed {
        delivery_tag,
        message: reason.to_string(),
    };
    tracing::error!(error = %error, "Broker channel closed");
    if let Err(e) = machine.on_channel_closed(&error.to_string()) {
        tracing::error!(error = %e, "Transport state machine rejected event");
    }
    reconnect_outcome(machine)
}

/// The reconnect recorded on the machine, or a generic one
pub fn reconnect_outcome(machine: &TransportStateMachine) -> RunOutcome {
    let signal = machine
        .reconnect_signal()
        .cloned()
        .unwrap_or_else(|| ReconnectSignal {
            was_consuming: false,
            reason: "connection ended".to_string(),
        });
    RunOutcome::Reconnect(signal)
}

/// Converts AMQP header values to text
///
/// Strings and integers are kept; other value types are skipped.
pub fn header_map(table: Option<&FieldTable>) -> Headers {
    let mut headers = Headers::new();
    let Some(table) = table else {
        return headers;
    };

    for (key, value) in table.inner() {
        let text = match value {
            AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
            AMQPValue::ShortString(s) => s.as_str().to_string(),
            AMQPValue::ShortShortInt(n) => n.to_string(),
            AMQPValue::ShortShortUInt(n) => n.to_string(),
            AMQPValue::ShortInt(n) => n.to_string(),
            AMQPValue::ShortUInt(n) => n.to_string(),
            AMQPValue::LongInt(n) => n.to_string(),
            AMQPValue::LongUInt(n) => n.to_string(),
            AMQPValue::LongLongInt(n) => n.to_string(),
            _ => {
                tracing::debug!(header = %key.as_str(), "Skipping non-text header");
                continue;
            }
        };
        headers.insert(key.as_str().to_string(), text);
    }

    headers
}

/// One broker connection attempt driving a [`DeliveryHandler`]
pub struct RabbitConsumer {
    settings: ConnectionSettings,
    handler: Arc<dyn DeliveryHandler>,
    health: HealthProbe,
    machine: TransportStateMachine,
    connection: Option<Connection>,
    channel: Option<Channel>,
}

impl RabbitConsumer {
    pub fn new(
        settings: ConnectionSettings,
        handler: Arc<dyn DeliveryHandler>,
        health: HealthProbe,
    ) -> Self {
        Self {
            settings,
            handler,
            health,
            machine: TransportStateMachine::new(),
            connection: None,
            channel: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn is_healthy(&self) -> bool {
        self.machine.is_healthy()
    }

    /// Connects, consumes until shutdown or disconnect, and reports why it ended
    ///
    /// Resources are left open; the caller must call [`RabbitConsumer::stop`].
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> RunOutcome {
        if *shutdown.borrow() {
            return RunOutcome::Shutdown;
        }

        let mut consumer = match self.open().await {
            Ok(consumer) => consumer,
            Err(outcome) => return outcome,
        };

        tracing::info!(
            queue = %self.settings.queue,
            broker = %self.settings.redacted_uri(),
            "Consuming"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return RunOutcome::Shutdown;
                    }
                }
                next = consumer.next() => {
                    let outcome = match next {
                        Some(Ok(delivery)) => self.on_message(delivery).await,
                        Some(Err(e)) => Err(self.closed_channel(&e.to_string())),
                        None => Err(self.closed_channel("consumer stream ended")),
                    };
                    if let Err(outcome) = outcome {
                        return outcome;
                    }
                }
            }
        }
    }

    /// Cancels the consumer, closes channel then connection
    ///
    /// Safe to call in any state and more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the state machine rejects a shutdown step.
    pub async fn stop(&mut self) -> Result<(), BrokerError> {
        if self.machine.state() == ConnectionState::Closed {
            self.release();
            return Ok(());
        }

        if self.machine.stop()? == ConnectionState::Cancelling {
            if let Some(channel) = &self.channel {
                if let Err(e) = channel
                    .basic_cancel(&self.settings.consumer_tag, BasicCancelOptions::default())
                    .await
                {
                    tracing::warn!(error = %e, "Consumer cancel failed");
                }
            }
            self.machine.on_cancel_ok()?;
        }

        if let Some(channel) = self.channel.take() {
            if channel.status().connected() {
                if let Err(e) = channel.close(REPLY_SUCCESS, "shutdown").await {
                    tracing::warn!(error = %e, "Channel close failed");
                }
            }
            if self.machine.state() != ConnectionState::Closed {
                self.machine.on_channel_closed("shutdown")?;
            }
        }

        if let Some(connection) = self.connection.take() {
            if connection.status().connected() {
                if let Err(e) = connection.close(REPLY_SUCCESS, "shutdown").await {
                    tracing::warn!(error = %e, "Connection close failed");
                }
            }
        }

        self.machine.on_closed()?;
        self.health.set(self.machine.is_healthy());
        tracing::info!(queue = %self.settings.queue, "Consumer stopped");
        Ok(())
    }

    async fn open(&mut self) -> Result<lapin::Consumer, RunOutcome> {
        self.step(|m| m.connect());

        let connection = match self.settings.open().await {
            Ok(connection) => connection,
            Err(e) => return Err(self.closed_connection(&e.to_string())),
        };
        self.step(|m| m.on_connection_open());

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                self.connection = Some(connection);
                let error = BrokerError::ChannelFailed(e.to_string());
                return Err(self.closed_channel(&error.to_string()));
            }
        };
        self.connection = Some(connection);
        self.step(|m| m.on_channel_open());

        if let Err(e) = channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
        {
            self.channel = Some(channel);
            let error = BrokerError::QosFailed(e.to_string());
            return Err(self.closed_channel(&error.to_string()));
        }
        self.step(|m| m.on_qos_ok());

        let consumer = channel
            .basic_consume(
                &self.settings.queue,
                &self.settings.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await;
        self.channel = Some(channel);

        match consumer {
            Ok(consumer) => {
                self.step(|m| m.on_consume_ok());
                Ok(consumer)
            }
            Err(e) => {
                let error = BrokerError::ConsumeFailed {
                    queue: self.settings.queue.clone(),
                    message: e.to_string(),
                };
                Err(self.closed_channel(&error.to_string()))
            }
        }
    }

    async fn on_message(&mut self, delivery: Delivery) -> Result<(), RunOutcome> {
        let headers = header_map(delivery.properties.headers().as_ref());
        let delivery_tag = delivery.delivery_tag;

        let verdict = self.handler.handle(&headers, &delivery.data).await;
        if let Err(e) = &verdict {
            tracing::error!(
                delivery_tag,
                error = %e,
                "Transient failure, leaving delivery unsettled"
            );
        }
        let settlement = settle_outcome(&mut self.machine, verdict);
        self.health.set(self.machine.is_healthy());
        let settlement = settlement?;

        let result = match settlement {
            Settlement::Ack => delivery
                .acker
                .ack(BasicAckOptions::default())
                .await
                .map(|_| ()),
            Settlement::DeadLetter => delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => {
                crate::log_settlement!(delivery_tag, settlement.as_str());
                Ok(())
            }
            Err(e) => {
                let outcome = settle_failed(&mut self.machine, delivery_tag, &e.to_string());
                self.health.set(self.machine.is_healthy());
                Err(outcome)
            }
        }
    }

    fn closed_channel(&mut self, reason: &str) -> RunOutcome {
        tracing::error!(reason, "Broker channel closed");
        self.step(|m| m.on_channel_closed(reason));
        self.reconnect_outcome()
    }

    fn closed_connection(&mut self, reason: &str) -> RunOutcome {
        tracing::error!(reason, "Broker connection closed");
        self.step(|m| m.on_connection_closed(reason));
        self.reconnect_outcome()
    }

    fn reconnect_outcome(&self) -> RunOutcome {
        reconnect_outcome(&self.machine)
    }

    /// Applies an event and publishes health; a rejected event is logged
    fn step<F>(&mut self, event: F)
    where
        F: FnOnce(&mut TransportStateMachine) -> Result<ConnectionState, BrokerError>,
    {
        if let Err(e) = event(&mut self.machine) {
            tracing::error!(error = %e, "Transport state machine rejected event");
        }
        self.health.set(self.machine.is_healthy());
    }

    fn release(&mut self) {
        self.channel = None;
        self.connection = None;
    }
}
