//! Schema codec abstraction

use crate::domain::errors::SchemaError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Body encoding named by the `encoder-type` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Avro object container
    #[default]
    Binary,
    /// JSON object, or an array of objects
    Json,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Binary => "binary",
            Encoding::Json => "json",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(Encoding::Binary),
            "json" => Ok(Encoding::Json),
            other => Err(SchemaError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// Decodes message bodies into records and encodes records into bodies
///
/// Records are carried as JSON values; processors deserialize them into their
/// own payload types.
#[async_trait]
pub trait SchemaCodec: Send + Sync {
    /// Decodes a body into zero or more records
    ///
    /// # Errors
    ///
    /// [`SchemaError::RegistryUnavailable`] is transient; every other variant
    /// means the body or its headers are unusable.
    async fn decode(
        &self,
        subject: &str,
        version: &str,
        encoding: Encoding,
        body: &[u8],
    ) -> Result<Vec<Value>, SchemaError>;

    /// Encodes a single record
    ///
    /// # Errors
    ///
    /// Same classification as [`SchemaCodec::decode`].
    async fn encode(
        &self,
        subject: &str,
        version: &str,
        encoding: Encoding,
        record: &Value,
    ) -> Result<Vec<u8>, SchemaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_parse() {
        assert_eq!("binary".parse::<Encoding>().unwrap(), Encoding::Binary);
        assert_eq!(" JSON ".parse::<Encoding>().unwrap(), Encoding::Json);
        assert!(matches!(
            "xml".parse::<Encoding>(),
            Err(SchemaError::UnsupportedEncoding(_))
        ));
        assert_eq!(Encoding::default(), Encoding::Binary);
    }
}
