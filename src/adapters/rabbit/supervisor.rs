//! Reconnect supervisor
//!
//! Keeps a consumer running on a dedicated thread with its own current-thread
//! runtime. Each connection attempt gets a fresh transport; when one signals a
//! reconnect the supervisor stops it, waits according to [`BackoffPolicy`],
//! and starts the next. A shutdown request ends the loop.

use super::consumer::{HealthProbe, RabbitConsumer, RunOutcome};
use crate::config::ReconnectConfig;
use crate::domain::errors::{BrokerError, LabportError};
use crate::domain::Result;
use async_trait::async_trait;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;

/// Linear reconnect backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub step: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            step: Duration::from_secs(config.backoff_step_seconds),
            max: Duration::from_secs(config.max_backoff_seconds),
        }
    }

    /// Delay before the next attempt
    ///
    /// Zero after a disconnect that followed successful consumption, otherwise
    /// the previous delay plus one step, capped at `max`.
    pub fn next_delay(&self, previous: Duration, was_consuming: bool) -> Duration {
        if was_consuming {
            Duration::ZERO
        } else {
            (previous + self.step).min(self.max)
        }
    }
}

/// One connection attempt as seen by the supervisor
#[async_trait]
pub trait Transport: Send {
    async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> RunOutcome;

    async fn stop(&mut self) -> std::result::Result<(), BrokerError>;
}

#[async_trait]
impl Transport for RabbitConsumer {
    async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> RunOutcome {
        RabbitConsumer::run(self, shutdown).await
    }

    async fn stop(&mut self) -> std::result::Result<(), BrokerError> {
        RabbitConsumer::stop(self).await
    }
}

/// Builds a fresh transport for each connection attempt
pub type TransportFactory = Box<dyn Fn(HealthProbe) -> Box<dyn Transport> + Send>;

/// Handle to a running supervisor thread
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    health: HealthProbe,
    thread: Option<JoinHandle<Result<()>>>,
}

impl SupervisorHandle {
    /// True while consuming or while a reconnect is pending
    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    /// Asks the supervisor to stop the current transport and exit
    pub fn shutdown(&self) {
        // Fails only when the loop has already exited
        let _ = self.shutdown.send(true);
    }

    /// Waits for the supervisor thread to finish
    ///
    /// # Errors
    ///
    /// Returns an error if the thread panicked or its runtime failed.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| LabportError::Other("supervisor thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

/// Runs transports until shutdown
pub struct Supervisor {
    factory: TransportFactory,
    policy: BackoffPolicy,
}

impl Supervisor {
    pub fn new(factory: TransportFactory, policy: BackoffPolicy) -> Self {
        Self { factory, policy }
    }

    /// Starts the supervisor on its own thread
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self) -> Result<SupervisorHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let health = HealthProbe::new();
        let thread_health = health.clone();

        let thread = std::thread::Builder::new()
            .name("labport-supervisor".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| LabportError::Other(format!("supervisor runtime: {e}")))?;
                runtime.block_on(self.run(shutdown_rx, thread_health));
                Ok(())
            })?;

        Ok(SupervisorHandle {
            shutdown: shutdown_tx,
            health,
            thread: Some(thread),
        })
    }

    /// The supervision loop
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, health: HealthProbe) {
        let mut delay = Duration::ZERO;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let mut transport = (self.factory)(health.clone());
            tracing::debug!(attempt, "Starting transport");

            let outcome = transport.run(&mut shutdown).await;
            if let Err(e) = transport.stop().await {
                tracing::warn!(error = %e, "Transport stop failed");
            }
            drop(transport);

            let signal = match outcome {
                RunOutcome::Shutdown => break,
                RunOutcome::Reconnect(signal) => signal,
            };

            delay = self.policy.next_delay(delay, signal.was_consuming);
            health.set(true);
            crate::log_reconnect!(delay, signal.was_consuming);
            tracing::debug!(reason = %signal.reason, "Reconnect reason");

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {}
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        health.set(false);
        tracing::info!("Supervisor stopped");
    }
}
