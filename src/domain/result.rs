//! Result type alias for Labport

use super::errors::LabportError;

/// Result type alias for Labport operations
///
/// # Examples
///
/// ```
/// use labport::domain::result::Result;
/// use labport::domain::errors::LabportError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(LabportError::Configuration("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, LabportError>;
