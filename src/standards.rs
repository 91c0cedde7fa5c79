//! Standard reference table
//!
//! Permissible limits (and optional ideal-value overrides) per parameter per
//! regulatory standard. Read-only once the engine starts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::error::ConfigError;

/// Well-known standard identifiers
pub mod ids {
    pub const WHO: &str = "WHO";
    pub const BIS: &str = "BIS";
}

/// Limit of one parameter under one standard
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardEntry {
    pub permissible_limit: f64,
    /// Overrides the parameter's registry ideal value when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_value: Option<f64>,
}

/// A named set of permissible limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standard {
    pub id: String,
    pub entries: BTreeMap<String, StandardEntry>,
}

impl Standard {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Builder-style limit insertion
    pub fn with_limit(mut self, parameter: &str, permissible_limit: f64) -> Self {
        self.set_entry(parameter, permissible_limit, None);
        self
    }

    /// Builder-style limit insertion with an ideal value override
    pub fn with_limit_and_ideal(mut self, parameter: &str, permissible_limit: f64, ideal: f64) -> Self {
        self.set_entry(parameter, permissible_limit, Some(ideal));
        self
    }

    pub fn set_entry(&mut self, parameter: &str, permissible_limit: f64, ideal_value: Option<f64>) {
        self.entries.insert(
            parameter.to_string(),
            StandardEntry {
                permissible_limit,
                ideal_value,
            },
        );
    }

    pub fn limit(&self, parameter: &str) -> Option<f64> {
        self.entries.get(parameter).map(|e| e.permissible_limit)
    }

    pub fn ideal_override(&self, parameter: &str) -> Option<f64> {
        self.entries.get(parameter).and_then(|e| e.ideal_value)
    }

    pub fn covers(&self, parameter: &str) -> bool {
        self.entries.contains_key(parameter)
    }

    fn check(&self) -> Result<(), ConfigError> {
        for (parameter, entry) in &self.entries {
            if !entry.permissible_limit.is_finite() || entry.permissible_limit <= 0.0 {
                return Err(ConfigError::InvalidReference(format!(
                    "{}: permissible limit for {} must be a positive number, got {}",
                    self.id, parameter, entry.permissible_limit
                )));
            }
            if let Some(ideal) = entry.ideal_value {
                if !ideal.is_finite() || ideal < 0.0 {
                    return Err(ConfigError::InvalidReference(format!(
                        "{}: ideal value for {} must be a non-negative number, got {}",
                        self.id, parameter, ideal
                    )));
                }
            }
        }
        Ok(())
    }
}

/// WHO drinking-water guideline values (mg/L)
const WHO_LIMITS: &[(&str, f64)] = &[
    ("pH", 8.5),
    ("TDS", 600.0),
    ("hardness", 500.0),
    ("chloride", 250.0),
    ("fluoride", 1.5),
    ("nitrate", 50.0),
    ("sulfate", 250.0),
    ("iron", 0.3),
    ("manganese", 0.4),
    ("lead", 0.01),
    ("cadmium", 0.003),
    ("arsenic", 0.01),
    ("chromium", 0.05),
    ("mercury", 0.006),
    ("nickel", 0.07),
    ("zinc", 3.0),
    ("copper", 2.0),
];

/// BIS IS 10500 acceptable limits (mg/L)
const BIS_LIMITS: &[(&str, f64)] = &[
    ("pH", 8.5),
    ("TDS", 500.0),
    ("hardness", 200.0),
    ("chloride", 250.0),
    ("fluoride", 1.0),
    ("nitrate", 45.0),
    ("sulfate", 200.0),
    ("iron", 0.3),
    ("manganese", 0.1),
    ("lead", 0.01),
    ("cadmium", 0.003),
    ("arsenic", 0.01),
    ("chromium", 0.05),
    ("mercury", 0.001),
    ("nickel", 0.02),
    ("zinc", 5.0),
    ("copper", 0.05),
];

fn builtin(id: &str, limits: &[(&str, f64)]) -> Standard {
    limits
        .iter()
        .fold(Standard::new(id), |standard, &(parameter, limit)| {
            standard.with_limit(parameter, limit)
        })
}

/// Lookup of standards by id. Safe for unsynchronized concurrent reads.
#[derive(Debug, Clone, Default)]
pub struct StandardTable {
    standards: HashMap<String, Standard>,
}

impl StandardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the built-in WHO and BIS standards
    pub fn with_defaults() -> Self {
        let mut standards = HashMap::new();
        for standard in [builtin(ids::WHO, WHO_LIMITS), builtin(ids::BIS, BIS_LIMITS)] {
            standards.insert(standard.id.clone(), standard);
        }
        info!(count = standards.len(), "Loaded built-in standards");
        Self { standards }
    }

    /// Add or replace a standard. Limits must be positive and finite.
    pub fn insert(&mut self, standard: Standard) -> Result<(), ConfigError> {
        standard.check()?;
        debug!(
            standard = %standard.id,
            parameters = standard.entries.len(),
            "Registering standard"
        );
        self.standards.insert(standard.id.clone(), standard);
        Ok(())
    }

    pub fn get(&self, standard_id: &str) -> Result<&Standard, ConfigError> {
        self.standards
            .get(standard_id)
            .ok_or_else(|| ConfigError::UnknownStandard(standard_id.to_string()))
    }

    /// Permissible limit of `parameter` under `standard_id`
    pub fn limit_for(&self, standard_id: &str, parameter: &str) -> Result<f64, ConfigError> {
        self.get(standard_id)?
            .limit(parameter)
            .ok_or_else(|| ConfigError::UnknownParameter {
                standard: standard_id.to_string(),
                parameter: parameter.to_string(),
            })
    }

    pub fn contains(&self, standard_id: &str) -> bool {
        self.standards.contains_key(standard_id)
    }

    /// Standard ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.standards.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
