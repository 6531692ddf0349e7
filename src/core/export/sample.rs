//! Sample update exporter
//!
//! Applies a validated update to a stored sample in one transaction. A sample
//! that does not exist is reported as `ValidationOutOfRangeValue`.

use super::plate::{abort_quietly, store_failure};
use crate::adapters::database::Storage;
use crate::core::processors::validation::SAMPLE_ORIGIN;
use crate::domain::errors::TransientError;
use crate::domain::feedback::{ErrorTypeCode, FeedbackError};
use crate::domain::messages::UpdateSampleMessage;
use crate::domain::plate::{SampleDocument, SampleUpdate};
use chrono::Utc;

/// Transactional writer for `update-sample` messages
pub struct SampleUpdateExporter {
    storage: Storage,
}

impl SampleUpdateExporter {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Applies the update, returning the stored document
    ///
    /// Returns `Ok(None)` after recording an error when the sample is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`TransientError`] when the primary store fails.
    pub async fn export(
        &self,
        message: &mut UpdateSampleMessage,
        update: &SampleUpdate,
    ) -> Result<Option<SampleDocument>, TransientError> {
        let uuid = message.payload.sample.sample_uuid.trim().to_string();
        let mut session = self
            .storage
            .store
            .begin()
            .await
            .map_err(|e| store_failure("Failed to open storage session", e))?;

        let existing = match session.find_sample(&uuid).await {
            Ok(existing) => existing,
            Err(e) => {
                abort_quietly(session).await;
                return Err(store_failure("Failed to look up sample", e));
            }
        };

        let Some(mut document) = existing else {
            abort_quietly(session).await;
            message.add_error(
                FeedbackError::new(
                    ErrorTypeCode::ValidationOutOfRangeValue,
                    SAMPLE_ORIGIN,
                    format!("Sample {uuid} does not exist"),
                )
                .with_sample_uuid(uuid.as_str())
                .with_field("sampleUuid"),
            );
            return Ok(None);
        };

        update.apply_to(&mut document, Utc::now());
        if let Err(e) = session.update_sample(&document).await {
            abort_quietly(session).await;
            return Err(store_failure("Failed to update sample", e));
        }
        session
            .commit()
            .await
            .map_err(|e| store_failure("Failed to commit sample update", e))?;
        tracing::info!(sample_uuid = %uuid, "Sample updated");

        if let Err(e) = self
            .storage
            .mirror
            .mirror_samples(std::slice::from_ref(&document))
            .await
        {
            crate::log_error_with_context!(&e, "Failed to mirror updated sample");
        }
        Ok(Some(document))
    }
}
