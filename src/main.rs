// Labport - Lab sample message consumer
// Copyright (c) 2025 Labport Contributors
// Licensed under the MIT License

use labport::cli::{Cli, Commands};
use labport::config::{load_config, LoggingConfig};
use labport::logging::init_logging;
use clap::Parser;
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (log_level, logging_config) = logging_settings(&cli);
    let _log_guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Labport - lab sample message consumer"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                    println!("\n⚠️  Shutdown signal received, finishing the current message...");
                    let _ = shutdown_tx.send(true);
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    println!("\n⚠️  Shutdown signal received, finishing the current message...");
                    let _ = shutdown_tx.send(true);
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            } else {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                println!("\n⚠️  Shutdown signal received, finishing the current message...");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    let exit_code = match execute_command(&cli, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5
        }
    };

    drop(_log_guard);
    process::exit(exit_code);
}

/// Log level and sinks for this invocation
///
/// `consume` logs to the sinks configured in the file; other commands, or a
/// config that fails to load, log to the console only. `--log-level` wins
/// over the configured level.
fn logging_settings(cli: &Cli) -> (String, LoggingConfig) {
    let console_only = LoggingConfig {
        local_enabled: false,
        local_path: String::new(),
        local_rotation: "daily".to_string(),
    };

    let (configured_level, logging) = match &cli.command {
        Commands::Consume(_) => match load_config(&cli.config) {
            Ok(config) => (Some(config.application.log_level), config.logging),
            Err(_) => (None, console_only),
        },
        _ => (None, console_only),
    };

    let level = cli
        .log_level
        .clone()
        .or(configured_level)
        .unwrap_or_else(|| "info".to_string());
    (level, logging)
}

async fn execute_command(cli: &Cli, shutdown_signal: watch::Receiver<bool>) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Consume(args) => args.execute(&cli.config, shutdown_signal).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
