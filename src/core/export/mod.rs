//! Transactional exporters
//!
//! Each exporter owns one storage session per message. Conflicts are business
//! outcomes recorded on the message; store failures are [`TransientError`]s.
//!
//! [`TransientError`]: crate::domain::TransientError

pub mod plate;
pub mod sample;

pub use plate::{PlateExport, PlateExporter};
pub use sample::SampleUpdateExporter;
