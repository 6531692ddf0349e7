//! Feedback publishing
//!
//! The [`FeedbackPublisher`] trait is the seam between the processors and the
//! broker. [`RabbitPublisher`] keeps its own lazily opened connection with
//! publisher confirms enabled; a failed publish drops that connection so the
//! next attempt starts fresh.

use super::connection::ConnectionSettings;
use super::consumer::Headers;
use crate::domain::errors::BrokerError;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

/// An encoded message ready to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Sends messages to the broker
#[async_trait]
pub trait FeedbackPublisher: Send + Sync {
    /// Publishes and waits for the broker to confirm
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PublishFailed`] when the message was not confirmed.
    async fn publish(&self, message: OutboundMessage) -> Result<(), BrokerError>;
}

struct PublisherLink {
    connection: Connection,
    channel: Channel,
}

/// lapin-backed publisher with publisher confirms
pub struct RabbitPublisher {
    settings: ConnectionSettings,
    link: Mutex<Option<PublisherLink>>,
}

impl RabbitPublisher {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            link: Mutex::new(None),
        }
    }

    async fn open_link(&self) -> Result<PublisherLink, BrokerError> {
        let connection = self.settings.open().await?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::ChannelFailed(e.to_string()))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BrokerError::ChannelFailed(format!("confirm select failed: {e}")))?;

        tracing::debug!(broker = %self.settings.redacted_uri(), "Publisher connection opened");
        Ok(PublisherLink {
            connection,
            channel,
        })
    }

    /// Closes the publisher connection if one is open
    pub async fn close(&self) {
        if let Some(link) = self.link.lock().await.take() {
            if let Err(e) = link.connection.close(200, "shutdown").await {
                tracing::warn!(error = %e, "Publisher connection close failed");
            }
        }
    }
}

fn field_table(headers: &Headers) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(
            ShortString::from(key.as_str()),
            AMQPValue::LongString(LongString::from(value.as_str())),
        );
    }
    table
}

#[async_trait]
impl FeedbackPublisher for RabbitPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<(), BrokerError> {
        let failed = |reason: String| BrokerError::PublishFailed {
            exchange: message.exchange.clone(),
            routing_key: message.routing_key.clone(),
            message: reason,
        };

        let mut guard = self.link.lock().await;
        let connected = guard
            .as_ref()
            .map(|link| link.channel.status().connected())
            .unwrap_or(false);
        if !connected {
            *guard = Some(self.open_link().await?);
        }
        let Some(link) = guard.as_ref() else {
            return Err(failed("publisher connection unavailable".to_string()));
        };

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_headers(field_table(&message.headers));

        let confirm = link
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await;

        let outcome = match confirm {
            Ok(confirm) => match confirm.await {
                Ok(Confirmation::Nack(_)) => Err(failed("broker nacked the message".to_string())),
                Ok(_) => Ok(()),
                Err(e) => Err(failed(format!("confirmation failed: {e}"))),
            },
            Err(e) => Err(failed(e.to_string())),
        };

        if outcome.is_err() {
            *guard = None;
        }
        outcome
    }
}

/// Publisher that records messages in memory
///
/// Used by tests. Can be switched into a failing mode to
/// exercise the feedback-failure path.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    sent: StdMutex<Vec<OutboundMessage>>,
    failing: StdMutex<bool>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following publish fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    /// Messages published so far
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FeedbackPublisher for InMemoryPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<(), BrokerError> {
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(BrokerError::PublishFailed {
                exchange: message.exchange,
                routing_key: message.routing_key,
                message: "publisher is in failing mode".to_string(),
            });
        }
        self.sent
            .lock()
            .map_err(|_| BrokerError::PublishFailed {
                exchange: message.exchange.clone(),
                routing_key: message.routing_key.clone(),
                message: "publisher lock poisoned".to_string(),
            })?
            .push(message);
        Ok(())
    }
}
