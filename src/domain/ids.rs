//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that flow through the pipeline. Each
//! type rejects values the rest of the system could not use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message subject newtype wrapper
///
/// Identifies the logical message type; it selects both the schema used to
/// decode a body and the processor that handles it.
///
/// # Examples
///
/// ```
/// use labport::domain::ids::Subject;
/// use std::str::FromStr;
///
/// let subject = Subject::from_str("create-plate").unwrap();
/// assert_eq!(subject.as_str(), "create-plate");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject(String);

impl Subject {
    /// Creates a new Subject from a string
    pub fn new(subject: impl Into<String>) -> Result<Self, String> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err("Subject cannot be empty".to_string());
        }
        Ok(Self(subject))
    }

    /// Returns the subject as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Plate barcode newtype wrapper
///
/// The barcode is the idempotency key of a source plate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlateBarcode(String);

impl PlateBarcode {
    /// Creates a new PlateBarcode, trimming surrounding whitespace
    pub fn new(barcode: impl Into<String>) -> Result<Self, String> {
        let barcode = barcode.into();
        let trimmed = barcode.trim();
        if trimmed.is_empty() {
            return Err("Plate barcode cannot be empty".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the barcode as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PlateBarcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlateBarcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Well coordinate on a 96-well plate
///
/// Accepts rows `A`-`H` and columns `1`-`12`, with or without zero padding,
/// and always renders the zero-padded form (`A1` and `A01` are both `A01`).
///
/// # Examples
///
/// ```
/// use labport::domain::ids::PlateCoordinate;
/// use std::str::FromStr;
///
/// let coordinate = PlateCoordinate::from_str("b7").unwrap();
/// assert_eq!(coordinate.as_str(), "B07");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlateCoordinate(String);

impl PlateCoordinate {
    const ROWS: &'static str = "ABCDEFGH";
    const MAX_COLUMN: u8 = 12;

    /// Parses and normalizes a coordinate
    pub fn new(coordinate: impl AsRef<str>) -> Result<Self, String> {
        let raw = coordinate.as_ref().trim();
        let mut chars = raw.chars();
        let row = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| Self::ROWS.contains(*c))
            .ok_or_else(|| format!("Invalid plate coordinate '{raw}': row must be A-H"))?;

        let column: u8 = chars
            .as_str()
            .parse()
            .map_err(|_| format!("Invalid plate coordinate '{raw}': column must be 1-12"))?;
        if column == 0 || column > Self::MAX_COLUMN {
            return Err(format!(
                "Invalid plate coordinate '{raw}': column must be 1-12"
            ));
        }

        Ok(Self(format!("{row}{column:02}")))
    }

    /// Returns the normalized coordinate
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlateCoordinate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_subject_empty_fails() {
        assert!(Subject::new("").is_err());
        assert!(Subject::new("  ").is_err());
    }

    #[test]
    fn test_plate_barcode_is_trimmed() {
        let barcode = PlateBarcode::new("  DN123456  ").unwrap();
        assert_eq!(barcode.as_str(), "DN123456");
        assert!(PlateBarcode::new("").is_err());
    }

    #[test_case("A1", "A01")]
    #[test_case("a01", "A01")]
    #[test_case("H12", "H12")]
    #[test_case(" c7 ", "C07")]
    fn test_plate_coordinate_normalizes(input: &str, expected: &str) {
        assert_eq!(PlateCoordinate::new(input).unwrap().as_str(), expected);
    }

    #[test_case("I1" ; "row out of range")]
    #[test_case("A0" ; "column zero")]
    #[test_case("A13" ; "column too large")]
    #[test_case("" ; "empty")]
    #[test_case("AA" ; "no column")]
    fn test_plate_coordinate_rejects(input: &str) {
        assert!(PlateCoordinate::new(input).is_err());
    }

    #[test]
    fn test_plate_coordinate_serialization() {
        let coordinate = PlateCoordinate::new("D4").unwrap();
        let json = serde_json::to_string(&coordinate).unwrap();
        assert_eq!(json, "\"D04\"");
    }
}
