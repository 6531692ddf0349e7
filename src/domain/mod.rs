//! Domain models and types for Labport.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`Subject`], [`PlateBarcode`], [`PlateCoordinate`])
//! - **Decoded messages** ([`CreatePlateMessage`], [`UpdateSampleMessage`])
//! - **Persisted entities** ([`SourcePlate`], [`SampleDocument`], [`ImportRecord`])
//! - **Feedback** ([`ErrorTypeCode`], [`FeedbackError`], [`FeedbackMessage`])
//! - **Error types** ([`LabportError`], [`TransientError`], [`ProcessingError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, LabportError>`]:
//!
//! ```rust,no_run
//! use labport::domain::Result;
//!
//! fn example() -> Result<()> {
//!     let config = labport::config::load_config("labport.toml")?;
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod feedback;
pub mod ids;
pub mod messages;
pub mod plate;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{BrokerError, LabportError, ProcessingError, SchemaError, TransientError};
pub use feedback::{ErrorTypeCode, ExportResult, FeedbackError, FeedbackMessage};
pub use ids::{PlateBarcode, PlateCoordinate, Subject};
pub use messages::{
    CreatePlateMessage, CreatePlatePayload, DomainMessage, ErrorLog, MessageStage,
    UpdateSampleMessage, UpdateSamplePayload,
};
pub use plate::{ImportRecord, SampleDocument, SampleUpdate, SourcePlate};
pub use result::Result;
