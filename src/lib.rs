//! Groundwater Water Quality Index engine
//!
//! Computes the Heavy Metal Pollution Index (HPI), Heavy Metal Evaluation
//! Index (HEI), Degree of Contamination (Cd) and user-defined formula indices
//! over groundwater samples, classifies each value into a quality band and
//! summarizes whole batches.

pub mod batch;
pub mod calculator;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod fake_samples;
pub mod formula;
pub mod models;
pub mod parameters;
pub mod reference;
pub mod standards;
pub mod validation;

pub use batch::{BatchOptions, BatchReport, BatchSummary, IndexSummary};
pub use calculator::IndexCalculator;
pub use catalog::{DefinitionCatalog, IndexDefinition};
pub use classifier::{BandTable, ClassificationBand};
pub use engine::IndexEngine;
pub use error::{ComputationError, ConfigError, EngineError, EngineResult, ValidationError};
pub use models::{DefinitionState, IndexKind, IndexResult, IndexValue, Sample, SampleInput};
pub use parameters::{Parameter, ParameterRegistry};
pub use standards::{Standard, StandardTable};
