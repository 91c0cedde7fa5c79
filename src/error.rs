//! Centralized error handling module
//!
//! Splits engine failures into the three families the engine distinguishes:
//! authoring-time validation, per-sample computation and batch-fatal
//! configuration errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::models::DefinitionState;

/// Errors raised while authoring an index definition.
///
/// Never produced during batch computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("malformed bands: {0}")]
    MalformedBands(String),

    #[error("malformed weights: {0}")]
    MalformedWeights(String),

    #[error("index definition has no parameters")]
    EmptyParameterList,

    #[error("'{0}' is a reserved formula word")]
    ReservedName(String),

    #[error("cannot move definition from {from} to {to}")]
    InvalidTransition {
        from: DefinitionState,
        to: DefinitionState,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Per-sample evaluation failure. Captured into the sample's
/// [`IndexResult`](crate::models::IndexResult), never thrown past a batch.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ComputationError {
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("division by zero in {0}")]
    DivisionByZero(String),

    #[error("degenerate range for {0}: permissible limit equals ideal value")]
    DegenerateRange(String),

    #[error("index value is not finite")]
    NonFiniteResult,

    #[error("index {0} has no validated formula")]
    UnvalidatedDefinition(String),
}

impl ComputationError {
    /// Stable key used for failure tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            ComputationError::MissingParameter(_) => "missing_parameter",
            ComputationError::DivisionByZero(_) => "division_by_zero",
            ComputationError::DegenerateRange(_) => "degenerate_range",
            ComputationError::NonFiniteResult => "non_finite_result",
            ComputationError::UnvalidatedDefinition(_) => "unvalidated_definition",
        }
    }
}

/// Reference data and batch setup errors. Batch-fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown standard: {0}")]
    UnknownStandard(String),

    #[error("standard {standard} has no entry for parameter {parameter}")]
    UnknownParameter { standard: String, parameter: String },

    #[error("index {definition} uses {parameter}, which standard {standard} does not define")]
    MissingLimit {
        definition: String,
        standard: String,
        parameter: String,
    },

    #[error("index {0} has not been validated")]
    DefinitionNotValidated(String),

    #[error("invalid reference data: {0}")]
    InvalidReference(String),

    #[error("failed to load reference data: {0}")]
    Load(String),
}

/// Engine-wide error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Error type classification used in structured reports
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Structured failure report emitted when a batch cannot run at all
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    /// Unique correlation ID for tracing
    pub correlation_id: String,
    /// Error type classification
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Timestamp of the error
    pub timestamp: String,
}

impl ErrorReport {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        let report = ErrorReport::new(err.error_type(), &err.to_string());

        error!(
            correlation_id = %report.correlation_id,
            error_type = %report.error_type,
            "Error report generated"
        );

        report
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// Result type alias for engine errors
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_mapping() {
        let err: EngineError = ConfigError::UnknownStandard("EPA".to_string()).into();
        assert_eq!(err.error_type(), "CONFIG_ERROR");

        let err: EngineError = ValidationError::EmptyParameterList.into();
        assert_eq!(err.error_type(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_computation_error_kind() {
        assert_eq!(
            ComputationError::MissingParameter("Pb".into()).kind(),
            "missing_parameter"
        );
        assert_eq!(ComputationError::NonFiniteResult.kind(), "non_finite_result");
        assert_eq!(
            ComputationError::UnvalidatedDefinition("X".into()).kind(),
            "unvalidated_definition"
        );
    }

    #[test]
    fn test_computation_error_serializes_as_marker() {
        let err = ComputationError::DivisionByZero("Pb".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "division_by_zero");
        assert_eq!(json["detail"], "Pb");
    }

    #[test]
    fn test_error_report_format() {
        let err = EngineError::NotFound("definition 42".to_string());
        let report = ErrorReport::from(&err);
        assert!(!report.correlation_id.is_empty());
        assert_eq!(report.error_type, "NOT_FOUND");
        assert!(report.message.contains("definition 42"));
    }
}
