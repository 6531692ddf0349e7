//! Schema registry HTTP client
//!
//! Fetches Avro schemas by subject and version:
//! `GET {base_url}/subjects/{subject}/versions/{version}` answering
//! `{"schema": "<avro json>", "version": n}`. Parsed schemas are cached for
//! the life of the client since a registered version never changes.

use crate::config::SchemaRegistryConfig;
use crate::domain::errors::SchemaError;
use apache_avro::Schema;
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

/// A parsed schema together with its registry coordinates
#[derive(Debug)]
pub struct RegisteredSchema {
    pub subject: String,
    pub version: String,
    pub schema: Schema,
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: String,
}

/// HTTP client for the schema registry
pub struct SchemaRegistryClient {
    base_url: Url,
    client: Client,
    api_key: Option<String>,
    cache: RwLock<HashMap<(String, String), Arc<RegisteredSchema>>>,
}

impl SchemaRegistryClient {
    /// Creates a client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SchemaRegistryConfig) -> Result<Self, SchemaError> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SchemaError::RegistryUnavailable(format!("HTTP client: {e}")))?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            SchemaError::RegistryUnavailable(format!("invalid registry URL {}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SchemaError::RegistryUnavailable(format!(
                "registry URL {} cannot carry a path",
                config.base_url
            )));
        }

        Ok(Self {
            base_url,
            client,
            api_key: config
                .api_key
                .as_ref()
                .map(|key| key.expose_secret().as_ref().to_string()),
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// `{base}/subjects/{subject}/versions/{version}` with each value as one
    /// escaped path segment
    fn schema_url(&self, subject: &str, version: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["subjects", subject, "versions", version]);
        }
        url
    }

    /// Returns the schema for a subject and version, fetching it on first use
    ///
    /// # Errors
    ///
    /// - [`SchemaError::RegistryUnavailable`] for network failures, timeouts,
    ///   authentication failures and 5xx answers
    /// - [`SchemaError::SchemaNotFound`] for 404
    /// - [`SchemaError::InvalidSchema`] when the answer cannot be parsed
    pub async fn schema(
        &self,
        subject: &str,
        version: &str,
    ) -> Result<Arc<RegisteredSchema>, SchemaError> {
        let key = (subject.to_string(), version.to_string());
        if let Some(schema) = self.cache.read().await.get(&key) {
            return Ok(schema.clone());
        }

        let fetched = Arc::new(self.fetch(subject, version).await?);
        self.cache.write().await.insert(key, fetched.clone());
        Ok(fetched)
    }

    async fn fetch(&self, subject: &str, version: &str) -> Result<RegisteredSchema, SchemaError> {
        let url = self.schema_url(subject, version);
        tracing::debug!(url = %url, "Fetching schema");

        let mut request = self.client.get(url.clone());
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SchemaError::RegistryUnavailable(format!("{url}: {e}")))?;

        match resp.status() {
            StatusCode::OK => {
                let body: SchemaResponse = resp.json().await.map_err(|e| {
                    SchemaError::InvalidSchema(format!("{subject} v{version}: {e}"))
                })?;
                let schema = Schema::parse_str(&body.schema).map_err(|e| {
                    SchemaError::InvalidSchema(format!("{subject} v{version}: {e}"))
                })?;

                tracing::info!(subject, version, "Schema loaded from registry");
                Ok(RegisteredSchema {
                    subject: subject.to_string(),
                    version: version.to_string(),
                    schema,
                })
            }
            StatusCode::NOT_FOUND => Err(SchemaError::SchemaNotFound {
                subject: subject.to_string(),
                version: version.to_string(),
            }),
            status
                if status.is_server_error()
                    || status == StatusCode::UNAUTHORIZED
                    || status == StatusCode::FORBIDDEN
                    || status == StatusCode::TOO_MANY_REQUESTS =>
            {
                Err(SchemaError::RegistryUnavailable(format!(
                    "{url} answered {status}"
                )))
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(SchemaError::InvalidSchema(format!(
                    "{url} answered {status}: {body}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    const PING_SCHEMA: &str = r#"{"type":"record","name":"Ping","fields":[{"name":"id","type":"string"}]}"#;

    fn config(base_url: String, api_key: Option<&str>) -> SchemaRegistryConfig {
        SchemaRegistryConfig {
            base_url,
            api_key: api_key.map(|k| secret_string(k.to_string())),
            timeout_seconds: 5,
        }
    }

    fn schema_body() -> String {
        serde_json::json!({ "schema": PING_SCHEMA, "version": 3 }).to_string()
    }

    #[tokio::test]
    async fn test_fetches_and_caches_schema() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/subjects/create-plate/versions/3")
            .match_header("x-api-key", "registry-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(schema_body())
            .expect(1)
            .create_async()
            .await;

        let client = SchemaRegistryClient::new(&config(server.url(), Some("registry-key"))).unwrap();
        let first = client.schema("create-plate", "3").await.unwrap();
        let second = client.schema("create-plate", "3").await.unwrap();

        assert_eq!(first.subject, "create-plate");
        assert!(Arc::ptr_eq(&first, &second));
        mock.assert_async().await;
    }

    #[test]
    fn test_schema_url_escapes_header_values() {
        let client = SchemaRegistryClient::new(&config(
            "http://registry.local/api/".to_string(),
            None,
        ))
        .unwrap();

        assert_eq!(
            client.schema_url("create-plate", "3").as_str(),
            "http://registry.local/api/subjects/create-plate/versions/3"
        );
        assert_eq!(
            client.schema_url("a/../../x", "1?x=1").as_str(),
            "http://registry.local/api/subjects/a%2F..%2F..%2Fx/versions/1%3Fx=1"
        );
        assert_eq!(client.base_url(), "http://registry.local/api");
    }

    #[tokio::test]
    async fn test_traversal_subject_stays_under_subjects() {
        let mut server = mockito::Server::new_async().await;
        let escaped = server
            .mock("GET", "/subjects/a%2F..%2F..%2Fx/versions/1")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = SchemaRegistryClient::new(&config(server.url(), None)).unwrap();
        let err = client.schema("a/../../x", "1").await.unwrap_err();
        assert!(matches!(err, SchemaError::SchemaNotFound { .. }));
        escaped.assert_async().await;
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(SchemaRegistryClient::new(&config("not a url".to_string(), None)).is_err());
    }

    #[tokio::test]
    async fn test_not_found_is_permanent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/subjects/unknown/versions/1")
            .with_status(404)
            .create_async()
            .await;

        let client = SchemaRegistryClient::new(&config(server.url(), None)).unwrap();
        let err = client.schema("unknown", "1").await.unwrap_err();
        assert!(matches!(err, SchemaError::SchemaNotFound { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/subjects/create-plate/versions/3")
            .with_status(503)
            .create_async()
            .await;

        let client = SchemaRegistryClient::new(&config(server.url(), None)).unwrap();
        let err = client.schema("create-plate", "3").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_transient() {
        let client =
            SchemaRegistryClient::new(&config("http://127.0.0.1:9".to_string(), None)).unwrap();
        let err = client.schema("create-plate", "3").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unparseable_schema_is_invalid() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/subjects/create-plate/versions/3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"schema": "{not avro", "version": 3}"#)
            .create_async()
            .await;

        let client = SchemaRegistryClient::new(&config(server.url(), None)).unwrap();
        let err = client.schema("create-plate", "3").await.unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema(_)));
    }
}
