//! Field validation rules
//!
//! Every rule records [`FeedbackError`]s instead of failing fast, so one
//! pass reports everything wrong with a message.

use crate::config::{CentreConfig, ProcessingConfig};
use crate::domain::feedback::{ErrorTypeCode, FeedbackError};
use crate::domain::ids::{PlateBarcode, PlateCoordinate};
use crate::domain::messages::{
    CreatePlateMessage, SamplePayload, UpdateSampleMessage,
};
use crate::domain::plate::SampleUpdate;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};

pub const PLATE_ORIGIN: &str = "plate";
pub const SAMPLE_ORIGIN: &str = "sample";

const ALLOWED_RESULTS: [&str; 3] = ["positive", "negative", "void"];
const UPDATABLE_FIELDS: [&str; 2] = ["mustSequence", "preferentiallySequence"];

/// Earliest accepted test date
pub fn earliest_tested_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn unpopulated(origin: &str, field: &str) -> FeedbackError {
    FeedbackError::new(
        ErrorTypeCode::ValidationUnpopulatedField,
        origin,
        format!("Value for field '{field}' has not been populated"),
    )
    .with_field(field)
}

fn sample_error(error: FeedbackError, sample_uuid: &str) -> FeedbackError {
    if sample_uuid.is_empty() {
        error
    } else {
        error.with_sample_uuid(sample_uuid)
    }
}

/// Values that occur more than once, ignoring blanks
fn repeated<'a, I>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values.into_iter().map(str::trim).filter(|v| !v.is_empty()) {
        *counts.entry(value).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(value, _)| value.to_string())
        .collect()
}

/// One `ValidationNonUniqueValue` per field whose values repeat across samples
pub fn duplicate_errors(samples: &[SamplePayload]) -> Vec<FeedbackError> {
    let coordinates: Vec<String> = samples
        .iter()
        .map(|s| {
            PlateCoordinate::new(&s.plate_coordinate)
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|_| s.plate_coordinate.trim().to_string())
        })
        .collect();

    let fields: [(&str, BTreeSet<String>); 5] = [
        ("sampleUuid", repeated(samples.iter().map(|s| s.sample_uuid.as_str()))),
        ("rootSampleId", repeated(samples.iter().map(|s| s.root_sample_id.as_str()))),
        ("rnaId", repeated(samples.iter().map(|s| s.rna_id.as_str()))),
        (
            "cogUkId",
            repeated(samples.iter().filter_map(|s| s.cog_uk_id.as_deref())),
        ),
        ("plateCoordinate", repeated(coordinates.iter().map(String::as_str))),
    ];

    fields
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(field, values)| {
            let listed: Vec<String> = values.into_iter().collect();
            FeedbackError::new(
                ErrorTypeCode::ValidationNonUniqueValue,
                SAMPLE_ORIGIN,
                format!(
                    "Field '{field}' has duplicated values: {}",
                    listed.join(", ")
                ),
            )
            .with_field(field)
        })
        .collect()
}

/// Result of validating a create-plate message
#[derive(Debug, Clone)]
pub struct PlateValidation {
    pub barcode: Option<PlateBarcode>,
    pub centre: Option<CentreConfig>,
}

/// Validates a create-plate message, recording every problem on it
pub fn validate_create_plate(
    message: &mut CreatePlateMessage,
    processing: &ProcessingConfig,
) -> PlateValidation {
    let mut errors = Vec::new();
    let plate = &message.payload.plate;

    let centre = if plate.lab_id.trim().is_empty() {
        errors.push(unpopulated(PLATE_ORIGIN, "labId"));
        None
    } else {
        let centre = processing.centre(plate.lab_id.trim()).cloned();
        if centre.is_none() {
            errors.push(
                FeedbackError::new(
                    ErrorTypeCode::ValidationCentreNotConfigured,
                    PLATE_ORIGIN,
                    format!("Centre '{}' has not been configured", plate.lab_id),
                )
                .with_field("labId"),
            );
        }
        centre
    };

    let barcode = match PlateBarcode::new(plate.plate_barcode.as_str()) {
        Ok(barcode) => Some(barcode),
        Err(_) => {
            errors.push(unpopulated(PLATE_ORIGIN, "plateBarcode"));
            None
        }
    };

    if plate.samples.is_empty() {
        errors.push(unpopulated(PLATE_ORIGIN, "samples"));
    }

    let created = message.payload.message_create_date_utc;
    for sample in &plate.samples {
        errors.extend(sample_errors(sample, created));
    }
    errors.extend(duplicate_errors(&plate.samples));

    for error in errors {
        message.add_error(error);
    }
    PlateValidation { barcode, centre }
}

fn sample_errors(sample: &SamplePayload, message_created: DateTime<Utc>) -> Vec<FeedbackError> {
    let uuid = sample.sample_uuid.trim();
    let mut errors = Vec::new();

    let required = [
        ("sampleUuid", &sample.sample_uuid),
        ("rootSampleId", &sample.root_sample_id),
        ("rnaId", &sample.rna_id),
        ("plateCoordinate", &sample.plate_coordinate),
        ("result", &sample.result),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.push(sample_error(unpopulated(SAMPLE_ORIGIN, field), uuid));
        }
    }

    if !sample.plate_coordinate.trim().is_empty() {
        if let Err(e) = PlateCoordinate::new(&sample.plate_coordinate) {
            errors.push(sample_error(
                FeedbackError::new(ErrorTypeCode::ValidationInvalidFormatValue, SAMPLE_ORIGIN, e)
                    .with_field("plateCoordinate"),
                uuid,
            ));
        }
    }

    let result = sample.result.trim().to_lowercase();
    if !result.is_empty() && !ALLOWED_RESULTS.contains(&result.as_str()) {
        errors.push(sample_error(
            FeedbackError::new(
                ErrorTypeCode::ValidationInvalidFormatValue,
                SAMPLE_ORIGIN,
                format!(
                    "Result '{}' is not one of {}",
                    sample.result,
                    ALLOWED_RESULTS.join(", ")
                ),
            )
            .with_field("result"),
            uuid,
        ));
    }

    if let Some(tested) = sample.tested_date_utc {
        if tested > message_created || tested < earliest_tested_date() {
            errors.push(sample_error(
                FeedbackError::new(
                    ErrorTypeCode::ValidationOutOfRangeValue,
                    SAMPLE_ORIGIN,
                    format!(
                        "Tested date {tested} must be between {} and the message creation time {message_created}",
                        earliest_tested_date()
                    ),
                )
                .with_field("testedDateUtc"),
                uuid,
            ));
        }
    }

    errors
}

/// Validates an update-sample message and extracts the update to apply
///
/// Returns `None` when any problem was recorded.
pub fn validate_update_sample(message: &mut UpdateSampleMessage) -> Option<SampleUpdate> {
    let mut errors = Vec::new();
    let sample = &message.payload.sample;
    let uuid = sample.sample_uuid.trim();

    if uuid.is_empty() {
        errors.push(unpopulated(SAMPLE_ORIGIN, "sampleUuid"));
    }
    if sample.updated_fields.is_empty() {
        errors.push(sample_error(unpopulated(SAMPLE_ORIGIN, "updatedFields"), uuid));
    }

    for name in repeated(sample.updated_fields.iter().map(|f| f.name.as_str())) {
        errors.push(sample_error(
            FeedbackError::new(
                ErrorTypeCode::ValidationNonUniqueValue,
                SAMPLE_ORIGIN,
                format!("Field '{name}' is updated more than once"),
            )
            .with_field(name),
            uuid,
        ));
    }

    let mut update = SampleUpdate::default();
    for field in &sample.updated_fields {
        if !UPDATABLE_FIELDS.contains(&field.name.as_str()) {
            errors.push(sample_error(
                FeedbackError::new(
                    ErrorTypeCode::ValidationInvalidFormatValue,
                    SAMPLE_ORIGIN,
                    format!("Field '{}' cannot be updated", field.name),
                )
                .with_field(field.name.as_str()),
                uuid,
            ));
            continue;
        }

        let Some(value) = field.value.as_bool() else {
            errors.push(sample_error(
                FeedbackError::new(
                    ErrorTypeCode::ValidationInvalidFormatValue,
                    SAMPLE_ORIGIN,
                    format!("Field '{}' must be a boolean, got {}", field.name, field.value),
                )
                .with_field(field.name.as_str()),
                uuid,
            ));
            continue;
        };

        match field.name.as_str() {
            "mustSequence" => update.must_sequence = Some(value),
            _ => update.preferentially_sequence = Some(value),
        }
    }

    let valid = errors.is_empty();
    for error in errors {
        message.add_error(error);
    }
    valid.then_some(update)
}
