//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Labport using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Labport - lab sample message consumer
#[derive(Parser, Debug)]
#[command(name = "labport")]
#[command(version, about, long_about = None)]
#[command(author = "Labport Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "labport.toml", env = "LABPORT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LABPORT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume plate and sample messages until stopped
    Consume(commands::consume::ConsumeArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_consume() {
        let cli = Cli::parse_from(["labport", "consume"]);
        assert_eq!(cli.config, "labport.toml");
        assert!(matches!(cli.command, Commands::Consume(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["labport", "--config", "custom.toml", "consume"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["labport", "--log-level", "debug", "consume"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_consume_skip_migrations() {
        let cli = Cli::parse_from(["labport", "consume", "--skip-migrations"]);
        match cli.command {
            Commands::Consume(args) => assert!(args.skip_migrations),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["labport", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["labport", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["labport", "export"]).is_err());
    }
}
