//! Consume command implementation
//!
//! Wires the schema registry, storage, feedback publisher and dispatcher
//! together, hands them to the reconnect supervisor and waits for a shutdown
//! signal.

use crate::adapters::database::create_storage;
use crate::adapters::rabbit::{
    BackoffPolicy, ConnectionSettings, HealthProbe, RabbitConsumer, RabbitPublisher, Supervisor,
    Transport, TransportFactory,
};
use crate::adapters::schema_registry::{RegistryCodec, SchemaCodec, SchemaRegistryClient};
use crate::config::{load_config, LabportConfig};
use crate::core::dispatch::{Dispatcher, ProcessorRegistry};
use crate::core::processors::{FeedbackSender, ProcessorContext};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the consume command
#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// Do not apply database migrations on startup
    #[arg(long)]
    pub skip_migrations: bool,
}

impl ConsumeArgs {
    /// Execute the consume command
    pub async fn execute(
        &self,
        config_path: &str,
        mut shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting consume command");

        let config = load_config(config_path)?;
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let settings = ConnectionSettings::from_config(&config.rabbitmq);
        let publisher = Arc::new(RabbitPublisher::new(settings.clone()));
        let dispatcher = match build_dispatcher(&config, publisher.clone(), !self.skip_migrations)
            .await
        {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                crate::log_error_with_context!(e, "Failed to initialise the pipeline");
                eprintln!("Failed to initialise the pipeline: {e}");
                return Ok(3);
            }
        };

        tracing::info!(
            broker = %settings.redacted_uri(),
            queue = %config.rabbitmq.queue,
            subjects = ?dispatcher.registry().subjects().collect::<Vec<_>>(),
            "Pipeline ready, starting consumer"
        );

        let factory: TransportFactory = Box::new(move |health: HealthProbe| {
            let handler = dispatcher.clone();
            Box::new(RabbitConsumer::new(settings.clone(), handler, health)) as Box<dyn Transport>
        });
        let supervisor =
            Supervisor::new(factory, BackoffPolicy::from_config(&config.reconnect)).spawn()?;

        let mut health_tick = tokio::time::interval(Duration::from_secs(
            config.application.health_log_interval_seconds,
        ));
        health_tick.tick().await;

        loop {
            tokio::select! {
                changed = shutdown_signal.changed() => {
                    if changed.is_err() || *shutdown_signal.borrow() {
                        break;
                    }
                }
                _ = health_tick.tick() => {
                    let healthy = supervisor.is_healthy();
                    if healthy {
                        tracing::info!(healthy, "Consumer health");
                    } else {
                        tracing::warn!(healthy, "Consumer health");
                    }
                }
            }
        }

        tracing::info!("Stopping consumer");
        supervisor.shutdown();
        let joined = tokio::task::spawn_blocking(move || supervisor.join()).await?;
        publisher.close().await;

        match joined {
            Ok(()) => {
                tracing::info!("Consumer stopped");
                Ok(0)
            }
            Err(e) => {
                tracing::error!(error = %e, "Supervisor exited with an error");
                Ok(5)
            }
        }
    }
}

/// Builds the dispatcher with every processor registered
async fn build_dispatcher(
    config: &LabportConfig,
    publisher: Arc<RabbitPublisher>,
    ensure_schema: bool,
) -> crate::domain::Result<Arc<Dispatcher>> {
    let registry = SchemaRegistryClient::new(&config.schema_registry)?;
    tracing::info!(registry = %registry.base_url(), "Using schema registry");
    let codec: Arc<dyn SchemaCodec> = Arc::new(RegistryCodec::new(registry));

    let storage = create_storage(config, ensure_schema).await?;
    storage.store.test_connection().await?;

    let feedback = FeedbackSender::new(codec.clone(), publisher, config.feedback.clone());
    let context = ProcessorContext {
        processing: config.processing.clone(),
        storage,
        feedback: Arc::new(feedback),
    };

    Ok(Arc::new(Dispatcher::new(
        codec,
        ProcessorRegistry::standard(&context),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_consume_runs_migrations_by_default() {
        let cli = Cli::try_parse_from(["labport", "consume"]).unwrap();
        match cli.command {
            Commands::Consume(args) => assert!(!args.skip_migrations),
            _ => panic!("Expected Consume command"),
        }
    }

    #[tokio::test]
    async fn test_consume_missing_config_is_an_error() {
        let args = ConsumeArgs {
            skip_migrations: true,
        };
        let (_tx, rx) = watch::channel(false);
        let result = args.execute("/nonexistent/labport.toml", rx).await;
        assert!(result.is_err());
    }
}
