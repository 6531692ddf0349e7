//! Secure credential handling using the secrecy crate
//!
//! Broker passwords, database connection strings and the schema registry API
//! key are held as [`SecretString`]. Memory is zeroed on drop, `Debug` output
//! is redacted, and the value is only reachable through `expose_secret()`.
//!
//! # Example
//!
//! ```rust
//! use labport::config::{SecretString, SecretValue};
//! use secrecy::{Secret, ExposeSecret};
//!
//! let password: SecretString = Secret::new(SecretValue::from("guest".to_string()));
//! assert_eq!(password.expose_secret().as_ref(), "guest");
//! println!("{:?}", password); // Prints: Secret([REDACTED ...])
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Newtype wrapper for String that implements the required traits for Secret
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    /// Check if the secret value is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if the secret value starts with a prefix
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Parse the secret value into another type
    pub fn parse<F: std::str::FromStr>(&self) -> Result<F, F::Err> {
        self.0.parse()
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// Type alias for a secret string
pub type SecretString = Secret<SecretValue>;

/// Wraps a String as a SecretString
///
/// ```rust
/// use labport::config::secret_string;
///
/// let password = secret_string("guest".to_string());
/// ```
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

/// Wraps an optional String as an optional SecretString
#[inline]
pub fn secret_string_opt(value: Option<String>) -> Option<SecretString> {
    value.map(secret_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_string_creation() {
        let secret = secret_string("guest".to_string());
        assert_eq!(secret.expose_secret(), "guest");
    }

    #[test]
    fn test_secret_string_opt() {
        assert!(secret_string_opt(Some("key".to_string())).is_some());
        assert!(secret_string_opt(None).is_none());
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("sensitive-data".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("sensitive-data"));
    }

    #[test]
    fn test_secret_serde() {
        #[derive(Serialize, Deserialize)]
        struct BrokerCredentials {
            password: SecretString,
        }

        let json = r#"{"password":"s3cret"}"#;
        let creds: BrokerCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.password.expose_secret(), "s3cret");
        assert_eq!(serde_json::to_string(&creds).unwrap(), json);
    }
}
