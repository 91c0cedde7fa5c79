//! Input validation module
//!
//! Checks ingested samples before they are handed to the engine. The engine
//! itself never rejects a sample; this is the ingestion side's gate.

use tracing::{debug, warn};
use validator::Validate;

use crate::error::ValidationError;
use crate::models::{Sample, SampleInput};
use crate::parameters::ParameterRegistry;

/// Validate an ingested sample and convert it into a [`Sample`].
///
/// Every parameter must be registered, finite and inside its valid range.
pub fn validate_sample(input: SampleInput, registry: &ParameterRegistry) -> Result<Sample, ValidationError> {
    // First, run struct-level validation
    if let Err(validation_errors) = input.validate() {
        let error_messages: Vec<String> = validation_errors
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let msgs: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|c| c.as_ref()))
                    .collect();
                format!("{}: {}", field, msgs.join(", "))
            })
            .collect();

        warn!(sample_id = %input.id, errors = ?error_messages, "Sample input validation failed");
        return Err(ValidationError::InvalidInput(error_messages.join("; ")));
    }

    let mut names: Vec<&String> = input.parameters.keys().collect();
    names.sort();
    for name in names {
        validate_measurement(registry, name, input.parameters[name])?;
    }

    debug!(sample_id = %input.id, parameters = input.parameters.len(), "Sample input validation passed");
    Ok(Sample::from(input))
}

/// Validate a batch of ingested samples, stopping at the first bad one
pub fn validate_samples(
    inputs: Vec<SampleInput>,
    registry: &ParameterRegistry,
) -> Result<Vec<Sample>, ValidationError> {
    inputs
        .into_iter()
        .map(|input| {
            let id = input.id.clone();
            validate_sample(input, registry)
                .map_err(|e| ValidationError::InvalidInput(format!("sample {}: {}", id, e)))
        })
        .collect()
}

/// Validate one measured value
fn validate_measurement(registry: &ParameterRegistry, name: &str, value: f64) -> Result<(), ValidationError> {
    let parameter = registry
        .get(name)
        .ok_or_else(|| ValidationError::UnknownParameter(name.to_string()))?;

    if !value.is_finite() {
        return Err(ValidationError::InvalidInput(format!(
            "{} must be a finite number",
            name
        )));
    }

    if !parameter.valid_range.contains(value) {
        return Err(ValidationError::InvalidInput(format!(
            "{} {} out of valid range [{}, {}] {}",
            name, value, parameter.valid_range.min, parameter.valid_range.max, parameter.unit
        )));
    }

    Ok(())
}
