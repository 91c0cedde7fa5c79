//! Parameter registry
//!
//! Canonical set of chemical parameters the engine knows about. Built once at
//! startup and shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ValidationError;
use crate::formula::is_reserved_word;

/// Inclusive physical range a measurement of a parameter may take
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A known chemical parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique formula symbol
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub ideal_value: f64,
    pub valid_range: ValueRange,
}

impl Parameter {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, valid_range: ValueRange) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            ideal_value: 0.0,
            valid_range,
        }
    }

    pub fn with_ideal(mut self, ideal_value: f64) -> Self {
        self.ideal_value = ideal_value;
        self
    }
}

/// (name, unit, ideal, min, max)
const DEFAULT_PARAMETERS: &[(&str, &str, f64, f64, f64)] = &[
    ("pH", "pH units", 7.0, 0.0, 14.0),
    ("TDS", "mg/L", 0.0, 0.0, 100_000.0),
    ("hardness", "mg/L CaCO3", 0.0, 0.0, 10_000.0),
    ("chloride", "mg/L", 0.0, 0.0, 50_000.0),
    ("fluoride", "mg/L", 0.0, 0.0, 100.0),
    ("nitrate", "mg/L", 0.0, 0.0, 1_000.0),
    ("sulfate", "mg/L", 0.0, 0.0, 10_000.0),
    ("iron", "mg/L", 0.0, 0.0, 100.0),
    ("manganese", "mg/L", 0.0, 0.0, 100.0),
    ("lead", "mg/L", 0.0, 0.0, 10.0),
    ("cadmium", "mg/L", 0.0, 0.0, 10.0),
    ("arsenic", "mg/L", 0.0, 0.0, 10.0),
    ("chromium", "mg/L", 0.0, 0.0, 10.0),
    ("mercury", "mg/L", 0.0, 0.0, 10.0),
    ("nickel", "mg/L", 0.0, 0.0, 10.0),
    ("zinc", "mg/L", 0.0, 0.0, 100.0),
    ("copper", "mg/L", 0.0, 0.0, 100.0),
];

/// Heavy metals used by the built-in HPI/HEI/Cd definitions
pub const HEAVY_METALS: &[&str] = &[
    "lead", "cadmium", "arsenic", "chromium", "mercury", "nickel", "zinc", "copper", "iron",
    "manganese",
];

/// Registry of known parameters, keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    parameters: BTreeMap<String, Parameter>,
}

impl ParameterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the standard groundwater parameters
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for &(name, unit, ideal, min, max) in DEFAULT_PARAMETERS {
            let parameter = Parameter::new(name, unit, ValueRange::new(min, max)).with_ideal(ideal);
            // Static table, names are known-good.
            registry.parameters.insert(name.to_string(), parameter);
        }
        registry
    }

    /// Register a parameter. Parameters are immutable once registered.
    pub fn register(&mut self, parameter: Parameter) -> Result<(), ValidationError> {
        validate_symbol(&parameter.name)?;

        let range = parameter.valid_range;
        if !range.min.is_finite() || !range.max.is_finite() || range.min < 0.0 || range.max <= range.min {
            return Err(ValidationError::InvalidInput(format!(
                "parameter {} has invalid range [{}, {}]",
                parameter.name, range.min, range.max
            )));
        }

        if !parameter.ideal_value.is_finite() || parameter.ideal_value < 0.0 {
            return Err(ValidationError::InvalidInput(format!(
                "parameter {} has invalid ideal value {}",
                parameter.name, parameter.ideal_value
            )));
        }

        if self.parameters.contains_key(&parameter.name) {
            return Err(ValidationError::InvalidInput(format!(
                "parameter {} is already registered",
                parameter.name
            )));
        }

        debug!(parameter = %parameter.name, unit = %parameter.unit, "Registering parameter");
        self.parameters.insert(parameter.name.clone(), parameter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Ideal value of a parameter, 0 when unknown
    pub fn ideal_value(&self, name: &str) -> f64 {
        self.parameters.get(name).map_or(0.0, |p| p.ideal_value)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }
}

/// Parameter symbols must be plain identifiers that the formula lexer can read
fn validate_symbol(name: &str) -> Result<(), ValidationError> {
    let mut chars = name.chars();
    let well_formed = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if !well_formed {
        return Err(ValidationError::InvalidInput(format!(
            "'{}' is not a valid parameter symbol",
            name
        )));
    }

    if is_reserved_word(name) {
        return Err(ValidationError::ReservedName(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = ParameterRegistry::with_defaults();
        assert_eq!(registry.len(), DEFAULT_PARAMETERS.len());
        assert_eq!(registry.ideal_value("pH"), 7.0);
        assert_eq!(registry.ideal_value("lead"), 0.0);
        for metal in HEAVY_METALS {
            assert!(registry.contains(metal), "{} missing", metal);
        }
    }

    #[test]
    fn test_register_custom_parameter() {
        let mut registry = ParameterRegistry::new();
        let uranium = Parameter::new("uranium", "mg/L", ValueRange::new(0.0, 5.0));
        registry.register(uranium).unwrap();
        assert!(registry.contains("uranium"));
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let mut registry = ParameterRegistry::with_defaults();
        let dup = Parameter::new("pH", "pH units", ValueRange::new(0.0, 14.0));
        assert!(registry.register(dup).is_err());
    }

    #[test]
    fn test_register_reserved_word_rejected() {
        let mut registry = ParameterRegistry::new();
        let bad = Parameter::new("Mi", "mg/L", ValueRange::new(0.0, 1.0));
        assert_eq!(
            registry.register(bad),
            Err(ValidationError::ReservedName("Mi".to_string()))
        );
    }

    #[test]
    fn test_register_invalid_symbol_and_range() {
        let mut registry = ParameterRegistry::new();
        assert!(registry
            .register(Parameter::new("2fast", "mg/L", ValueRange::new(0.0, 1.0)))
            .is_err());
        assert!(registry
            .register(Parameter::new("boron", "mg/L", ValueRange::new(-1.0, 1.0)))
            .is_err());
        assert!(registry
            .register(Parameter::new("boron", "mg/L", ValueRange::new(2.0, 1.0)))
            .is_err());
    }

    #[test]
    fn test_value_range_contains() {
        let range = ValueRange::new(0.0, 14.0);
        assert!(range.contains(0.0));
        assert!(range.contains(14.0));
        assert!(!range.contains(14.1));
    }
}
