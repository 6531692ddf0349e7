//! Message envelope
//!
//! [`RabbitMessage`] wraps one delivery. Decoding is an explicit step:
//! [`RabbitMessage::decode`] runs the codec and [`RabbitMessage::records`]
//! exposes the result afterwards. Decoding does not check how many records
//! came out; that is the dispatcher's call.

use crate::adapters::rabbit::Headers;
use crate::adapters::schema_registry::{Encoding, SchemaCodec};
use crate::domain::errors::SchemaError;
use crate::domain::ids::Subject;
use serde_json::Value;

pub const SUBJECT_HEADER: &str = "subject";
pub const SCHEMA_VERSION_HEADER: &str = "schema-version";
pub const ENCODER_TYPE_HEADER: &str = "encoder-type";

/// One delivered message and its decode result
#[derive(Debug, Clone)]
pub struct RabbitMessage {
    headers: Headers,
    body: Vec<u8>,
    records: Option<Vec<Value>>,
}

impl RabbitMessage {
    pub fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self {
            headers,
            body,
            records: None,
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn required_header(&self, name: &str) -> Result<&str, SchemaError> {
        self.headers
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SchemaError::MissingHeader(name.to_string()))
    }

    /// Subject selecting the schema and the processor
    pub fn subject(&self) -> Result<Subject, SchemaError> {
        let raw = self.required_header(SUBJECT_HEADER)?;
        Subject::new(raw).map_err(|_| SchemaError::MissingHeader(SUBJECT_HEADER.to_string()))
    }

    pub fn schema_version(&self) -> Result<&str, SchemaError> {
        self.required_header(SCHEMA_VERSION_HEADER)
    }

    /// Body encoding, `binary` when the header is absent
    pub fn encoding(&self) -> Result<Encoding, SchemaError> {
        match self.headers.get(ENCODER_TYPE_HEADER) {
            Some(value) => value.trim().parse(),
            None => Ok(Encoding::default()),
        }
    }

    /// Decodes the body with the schema named by the headers
    ///
    /// # Errors
    ///
    /// Returns the codec's error, or [`SchemaError::MissingHeader`] when the
    /// subject or version header is absent. A failed decode leaves the
    /// message undecoded.
    pub async fn decode(&mut self, codec: &dyn SchemaCodec) -> Result<(), SchemaError> {
        let subject = self.subject()?;
        let version = self.schema_version()?;
        let encoding = self.encoding()?;

        let records = codec
            .decode(subject.as_str(), version, encoding, &self.body)
            .await?;
        self.records = Some(records);
        Ok(())
    }

    /// Decoded records in body order, `None` before a successful decode
    pub fn records(&self) -> Option<&[Value]> {
        self.records.as_deref()
    }

    /// Takes the single decoded record
    ///
    /// `None` unless decoding produced exactly one record.
    pub fn into_single_record(self) -> Option<Value> {
        match self.records {
            Some(mut records) if records.len() == 1 => records.pop(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::schema_registry::JsonCodec;
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_header_accessors() {
        let message = RabbitMessage::new(
            headers(&[("subject", "create-plate"), ("schema-version", "3")]),
            Vec::new(),
        );
        assert_eq!(message.subject().unwrap().as_str(), "create-plate");
        assert_eq!(message.schema_version().unwrap(), "3");
        assert_eq!(message.encoding().unwrap(), Encoding::Binary);
    }

    #[test]
    fn test_missing_and_blank_headers() {
        let message = RabbitMessage::new(headers(&[("subject", " ")]), Vec::new());
        assert!(matches!(message.subject(), Err(SchemaError::MissingHeader(h)) if h == "subject"));
        assert!(matches!(
            message.schema_version(),
            Err(SchemaError::MissingHeader(h)) if h == "schema-version"
        ));
    }

    #[test]
    fn test_unknown_encoder_type_is_rejected() {
        let message = RabbitMessage::new(headers(&[("encoder-type", "xml")]), Vec::new());
        assert!(matches!(
            message.encoding(),
            Err(SchemaError::UnsupportedEncoding(_))
        ));
    }

    #[tokio::test]
    async fn test_decode_then_records() {
        let codec = JsonCodec::new(["create-plate"]);
        let body = serde_json::to_vec(&json!([{"n": 1}, {"n": 2}])).unwrap();
        let mut message = RabbitMessage::new(
            headers(&[
                ("subject", "create-plate"),
                ("schema-version", "1"),
                ("encoder-type", "json"),
            ]),
            body,
        );

        assert!(message.records().is_none());
        message.decode(&codec).await.unwrap();
        assert_eq!(message.records().unwrap().len(), 2);
        assert!(message.into_single_record().is_none());
    }

    #[tokio::test]
    async fn test_failed_decode_leaves_message_undecoded() {
        let codec = JsonCodec::new(["create-plate"]);
        let mut message = RabbitMessage::new(
            headers(&[("subject", "create-plate"), ("schema-version", "1")]),
            b"not json".to_vec(),
        );

        let err = message.decode(&codec).await.unwrap_err();
        assert!(matches!(err, SchemaError::DecodeFailed(_)));
        assert!(message.records().is_none());
    }
}
