//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "labport.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing Labport configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Create a .env file with your credentials:");
                println!("     - Set LABPORT_RABBITMQ_PASSWORD");
                println!("     - Set LABPORT_DATABASE_URL");
                println!("  3. Validate configuration: labport validate-config");
                println!("  4. Start consuming: labport consume");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# Labport Configuration File

environment = "development"

[rabbitmq]
host = "localhost"
username = "labport"
password = "${LABPORT_RABBITMQ_PASSWORD}"
queue = "heron.plates"

[schema_registry]
base_url = "http://localhost:8081"

[processing]
centres = [{ lab_id = "CPTD", name = "Alderley" }]

[database]
connection_string = "${LABPORT_DATABASE_URL}"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# Labport Configuration File
# Consumes plate and sample messages from RabbitMQ, validates them,
# stores accepted samples in PostgreSQL and publishes feedback.

# development | staging | production
# Production requires use_ssl = true for the broker
environment = "development"

[application]
log_level = "info"                    # trace | debug | info | warn | error
health_log_interval_seconds = 60

[rabbitmq]
host = "localhost"
port = 5672                           # 5671 for AMQPS
vhost = "/"
username = "labport"
password = "${LABPORT_RABBITMQ_PASSWORD}"
use_ssl = false
ca_bundle_env = "REQUESTS_CA_BUNDLE"  # env var naming the CA bundle path
queue = "heron.plates"
consumer_tag = "labport"
connection_name = "labport-consumer"

[feedback]
exchange = "psd.heron"
create_plate_routing_key = "feedback.created.plate"
update_sample_routing_key = "feedback.updated.sample"
schema_version = "1"

[schema_registry]
base_url = "http://localhost:8081"
# api_key = "${LABPORT_REGISTRY_KEY}"
timeout_seconds = 10

[processing]
# Lab IDs accepted in create-plate messages
centres = [
    { lab_id = "CPTD", name = "Alderley" },
    { lab_id = "MILK", name = "Milton Keynes" },
]

[database]
connection_string = "${LABPORT_DATABASE_URL}"
max_connections = 10
connection_timeout_seconds = 30
statement_timeout_seconds = 60
ssl_mode = "prefer"                   # disable | prefer | require

# Optional secondary database that accepted samples are copied into
# [mirror]
# connection_string = "${LABPORT_MIRROR_URL}"
# ssl_mode = "require"

[reconnect]
backoff_step_seconds = 1
max_backoff_seconds = 30

[logging]
local_enabled = true
local_path = "/var/log/labport"
local_rotation = "daily"              # daily | hourly | never
"#
        .to_string()
    }
}
