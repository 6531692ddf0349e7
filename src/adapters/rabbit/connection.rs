//! Broker connection settings
//!
//! Builds the AMQP URI and TLS material from [`RabbitMqConfig`] and opens
//! lapin connections. Shared by the consumer and the feedback publisher.

use crate::config::{RabbitMqConfig, SecretString};
use crate::domain::errors::BrokerError;
use lapin::tcp::OwnedTLSConfig;
use lapin::{Connection, ConnectionProperties};
use secrecy::ExposeSecret;
use url::Url;

/// Everything needed to open a broker connection
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub username: String,
    password: SecretString,
    pub use_ssl: bool,
    pub ca_bundle_env: String,
    pub queue: String,
    pub consumer_tag: String,
    pub connection_name: String,
}

impl ConnectionSettings {
    pub fn from_config(config: &RabbitMqConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            vhost: config.vhost.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            use_ssl: config.use_ssl,
            ca_bundle_env: config.ca_bundle_env.clone(),
            queue: config.queue.clone(),
            consumer_tag: config.consumer_tag.clone(),
            connection_name: config.connection_name.clone(),
        }
    }

    /// AMQP URI including credentials
    ///
    /// The virtual host is percent-encoded as a single path segment, so the
    /// default vhost `/` becomes `%2F`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot form a valid URI.
    pub fn uri(&self) -> Result<String, BrokerError> {
        let scheme = if self.use_ssl { "amqps" } else { "amqp" };
        let mut url = Url::parse(&format!("{}://{}:{}", scheme, self.host, self.port))
            .map_err(|e| BrokerError::ConnectionFailed(format!("invalid broker address: {e}")))?;

        url.set_username(&self.username)
            .map_err(|_| BrokerError::ConnectionFailed("invalid broker username".to_string()))?;
        url.set_password(Some(self.password.expose_secret().as_ref()))
            .map_err(|_| BrokerError::ConnectionFailed("invalid broker password".to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BrokerError::ConnectionFailed("broker URI cannot carry a vhost".to_string()))?
            .clear()
            .push(&self.vhost);

        Ok(url.into())
    }

    /// URI with the password removed, for logging
    pub fn redacted_uri(&self) -> String {
        let scheme = if self.use_ssl { "amqps" } else { "amqp" };
        format!(
            "{}://{}@{}:{}/{}",
            scheme, self.username, self.host, self.port, self.vhost
        )
    }

    /// TLS configuration, reading the CA bundle from the path in `ca_bundle_env`
    ///
    /// Without TLS, or when the variable is unset, the default trust store is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable names a file that cannot be read.
    pub fn tls_config(&self) -> Result<OwnedTLSConfig, BrokerError> {
        if !self.use_ssl {
            return Ok(OwnedTLSConfig::default());
        }

        match std::env::var(&self.ca_bundle_env) {
            Ok(path) => {
                let pem = std::fs::read_to_string(&path).map_err(|e| {
                    BrokerError::Tls(format!("cannot read CA bundle {path}: {e}"))
                })?;
                Ok(OwnedTLSConfig {
                    identity: None,
                    cert_chain: Some(pem),
                })
            }
            Err(_) => {
                tracing::debug!(
                    variable = %self.ca_bundle_env,
                    "CA bundle variable not set, using default trust store"
                );
                Ok(OwnedTLSConfig::default())
            }
        }
    }

    /// Opens a new broker connection
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] or [`BrokerError::Tls`].
    pub async fn open(&self) -> Result<Connection, BrokerError> {
        let uri = self.uri()?;
        let tls = self.tls_config()?;
        let properties =
            ConnectionProperties::default().with_connection_name(self.connection_name.clone().into());

        Connection::connect_with_config(&uri, properties, tls)
            .await
            .map_err(|e| {
                BrokerError::ConnectionFailed(format!("{}: {}", self.redacted_uri(), e))
            })
    }
}
