//! Record codecs
//!
//! [`RegistryCodec`] resolves schemas through the registry and encodes Avro
//! object containers (`binary`) or schema-checked JSON (`json`).
//! [`JsonCodec`] needs no registry and backs the pipeline tests.

use super::client::SchemaRegistryClient;
use super::traits::{Encoding, SchemaCodec};
use crate::domain::errors::SchemaError;
use apache_avro::types::Value as AvroValue;
use apache_avro::{Reader, Schema, Writer};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Splits a JSON body into records: an object is one record, an array is many
fn json_records(body: &[u8]) -> Result<Vec<Value>, SchemaError> {
    let parsed: Value = serde_json::from_slice(body)
        .map_err(|e| SchemaError::DecodeFailed(format!("invalid JSON body: {e}")))?;
    match parsed {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![parsed]),
        other => Err(SchemaError::DecodeFailed(format!(
            "expected a JSON object or array, got {other}"
        ))),
    }
}

/// Checks a JSON record against an Avro schema, returning the resolved value
fn conform(schema: &Schema, record: &Value) -> Result<AvroValue, SchemaError> {
    AvroValue::from(record.clone())
        .resolve(schema)
        .map_err(|e| SchemaError::DecodeFailed(format!("record does not match schema: {e}")))
}

/// Codec backed by the schema registry
pub struct RegistryCodec {
    registry: SchemaRegistryClient,
}

impl RegistryCodec {
    pub fn new(registry: SchemaRegistryClient) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl SchemaCodec for RegistryCodec {
    async fn decode(
        &self,
        subject: &str,
        version: &str,
        encoding: Encoding,
        body: &[u8],
    ) -> Result<Vec<Value>, SchemaError> {
        let registered = self.registry.schema(subject, version).await?;

        match encoding {
            Encoding::Binary => {
                let reader = Reader::with_schema(&registered.schema, body)
                    .map_err(|e| SchemaError::DecodeFailed(e.to_string()))?;
                let mut records = Vec::new();
                for value in reader {
                    let value = value.map_err(|e| SchemaError::DecodeFailed(e.to_string()))?;
                    let json = Value::try_from(value)
                        .map_err(|e| SchemaError::DecodeFailed(e.to_string()))?;
                    records.push(json);
                }
                Ok(records)
            }
            Encoding::Json => {
                let records = json_records(body)?;
                for record in &records {
                    conform(&registered.schema, record)?;
                }
                Ok(records)
            }
        }
    }

    async fn encode(
        &self,
        subject: &str,
        version: &str,
        encoding: Encoding,
        record: &Value,
    ) -> Result<Vec<u8>, SchemaError> {
        let registered = self.registry.schema(subject, version).await?;
        let value = conform(&registered.schema, record)
            .map_err(|e| SchemaError::EncodeFailed(e.to_string()))?;

        match encoding {
            Encoding::Binary => {
                let mut writer = Writer::new(&registered.schema, Vec::new());
                writer
                    .append(value)
                    .map_err(|e| SchemaError::EncodeFailed(e.to_string()))?;
                writer
                    .into_inner()
                    .map_err(|e| SchemaError::EncodeFailed(e.to_string()))
            }
            Encoding::Json => {
                serde_json::to_vec(record).map_err(|e| SchemaError::EncodeFailed(e.to_string()))
            }
        }
    }
}

/// Schema-less JSON codec for a fixed set of subjects
///
/// Every subject is accepted at any version. The codec can be switched into
/// an unavailable mode that fails like an unreachable registry.
#[derive(Debug, Default)]
pub struct JsonCodec {
    subjects: HashSet<String>,
    unavailable: AtomicBool,
}

impl JsonCodec {
    pub fn new<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self, subject: &str, version: &str) -> Result<(), SchemaError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SchemaError::RegistryUnavailable(
                "codec marked unavailable".to_string(),
            ));
        }
        if !self.subjects.contains(subject) {
            return Err(SchemaError::SchemaNotFound {
                subject: subject.to_string(),
                version: version.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaCodec for JsonCodec {
    async fn decode(
        &self,
        subject: &str,
        version: &str,
        _encoding: Encoding,
        body: &[u8],
    ) -> Result<Vec<Value>, SchemaError> {
        self.check(subject, version)?;
        json_records(body)
    }

    async fn encode(
        &self,
        subject: &str,
        version: &str,
        _encoding: Encoding,
        record: &Value,
    ) -> Result<Vec<u8>, SchemaError> {
        self.check(subject, version)?;
        serde_json::to_vec(record).map_err(|e| SchemaError::EncodeFailed(e.to_string()))
    }
}
