//! Data models for samples, index results and definition lifecycle
//!
//! Defines the core data structures exchanged across the engine boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use validator::Validate;

use crate::classifier::ClassificationBand;
use crate::error::ComputationError;

/// A groundwater sample as delivered by ingestion.
///
/// Immutable once created; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Ingestion-assigned identifier (e.g. "S-0001")
    pub id: String,

    /// Sampling location (well, borehole, ...)
    pub location_id: String,

    /// When the sample was taken
    pub timestamp: DateTime<Utc>,

    /// Measured concentration per parameter symbol
    pub parameters: BTreeMap<String, f64>,
}

impl Sample {
    /// Create a sample stamped with the current time
    pub fn new(
        id: impl Into<String>,
        location_id: impl Into<String>,
        parameters: impl IntoIterator<Item = (String, f64)>,
    ) -> Self {
        Self {
            id: id.into(),
            location_id: location_id.into(),
            timestamp: Utc::now(),
            parameters: parameters.into_iter().collect(),
        }
    }

    /// Measured value for a parameter, if present
    pub fn measured(&self, parameter: &str) -> Option<f64> {
        self.parameters.get(parameter).copied()
    }
}

/// Input DTO produced by ingestion before it is accepted as a [`Sample`]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SampleInput {
    #[validate(length(min = 1, max = 128, message = "Sample id must be 1-128 characters"))]
    pub id: String,

    #[validate(length(min = 1, max = 128, message = "Location id must be 1-128 characters"))]
    pub location_id: String,

    /// Optional sampling time (defaults to ingestion time)
    pub timestamp: Option<DateTime<Utc>>,

    #[validate(length(min = 1, message = "Sample must carry at least one parameter"))]
    pub parameters: HashMap<String, f64>,
}

impl From<SampleInput> for Sample {
    fn from(input: SampleInput) -> Self {
        Sample {
            id: input.id,
            location_id: input.location_id,
            timestamp: input.timestamp.unwrap_or_else(Utc::now),
            parameters: input.parameters.into_iter().collect(),
        }
    }
}

/// Index family of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Heavy Metal Pollution Index
    #[serde(rename = "HPI")]
    Hpi,
    /// Heavy Metal Evaluation Index
    #[serde(rename = "HEI")]
    Hei,
    /// Degree of Contamination
    #[serde(rename = "Cd")]
    Cd,
    /// User-authored formula
    #[serde(rename = "custom")]
    Custom,
}

impl IndexKind {
    pub fn is_builtin(&self) -> bool {
        !matches!(self, IndexKind::Custom)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Hpi => "HPI",
            IndexKind::Hei => "HEI",
            IndexKind::Cd => "Cd",
            IndexKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Lifecycle of an index definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionState {
    Draft,
    Validated,
    Saved,
    Deprecated,
}

impl DefinitionState {
    /// Whether a definition in this state may be used by a new batch
    pub fn is_computable(&self) -> bool {
        matches!(self, DefinitionState::Validated | DefinitionState::Saved)
    }
}

impl fmt::Display for DefinitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DefinitionState::Draft => "draft",
            DefinitionState::Validated => "validated",
            DefinitionState::Saved => "saved",
            DefinitionState::Deprecated => "deprecated",
        };
        f.write_str(name)
    }
}

/// Numeric outcome of one index on one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexValue {
    Value(f64),
    Error(ComputationError),
}

impl IndexValue {
    pub fn as_value(&self) -> Option<f64> {
        match self {
            IndexValue::Value(v) => Some(*v),
            IndexValue::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&ComputationError> {
        match self {
            IndexValue::Value(_) => None,
            IndexValue::Error(e) => Some(e),
        }
    }
}

impl From<Result<f64, ComputationError>> for IndexValue {
    fn from(result: Result<f64, ComputationError>) -> Self {
        match result {
            Ok(v) => IndexValue::Value(v),
            Err(e) => IndexValue::Error(e),
        }
    }
}

/// Classified index value for one sample. Produced only by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexResult {
    pub sample_id: String,
    pub index_name: String,
    pub value: IndexValue,
    /// Absent when `value` is an error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<ClassificationBand>,
    pub computed_at: DateTime<Utc>,
}

impl IndexResult {
    pub fn is_error(&self) -> bool {
        matches!(self.value, IndexValue::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_creation() {
        let sample = Sample::new(
            "S-1",
            "Well-001",
            vec![("pH".to_string(), 7.2), ("TDS".to_string(), 450.0)],
        );

        assert_eq!(sample.measured("pH"), Some(7.2));
        assert_eq!(sample.measured("Pb"), None);
    }

    #[test]
    fn test_sample_input_conversion() {
        let input = SampleInput {
            id: "S-2".to_string(),
            location_id: "Well-002".to_string(),
            timestamp: None,
            parameters: HashMap::from([("fluoride".to_string(), 0.8)]),
        };

        let sample: Sample = input.into();
        assert_eq!(sample.location_id, "Well-002");
        assert_eq!(sample.measured("fluoride"), Some(0.8));
    }

    #[test]
    fn test_sample_input_validation() {
        let empty = SampleInput {
            id: String::new(),
            location_id: "Well-003".to_string(),
            timestamp: None,
            parameters: HashMap::new(),
        };

        let errors = empty.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("id"));
        assert!(errors.field_errors().contains_key("parameters"));
    }

    #[test]
    fn test_index_value_serialization() {
        let ok = serde_json::to_value(IndexValue::Value(13.5)).unwrap();
        assert_eq!(ok["value"], 13.5);

        let failed = IndexValue::Error(ComputationError::MissingParameter("Pb".into()));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"]["kind"], "missing_parameter");
    }

    #[test]
    fn test_definition_state_computable() {
        assert!(!DefinitionState::Draft.is_computable());
        assert!(DefinitionState::Validated.is_computable());
        assert!(DefinitionState::Saved.is_computable());
        assert!(!DefinitionState::Deprecated.is_computable());
    }

    #[test]
    fn test_index_kind_display() {
        assert_eq!(IndexKind::Hpi.to_string(), "HPI");
        assert!(IndexKind::Cd.is_builtin());
        assert!(!IndexKind::Custom.is_builtin());
    }
}
