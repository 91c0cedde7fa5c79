//! Reference data loading
//!
//! Reads parameter definitions and `(standard, parameter, limit, ideal)`
//! tuples from a JSON, TOML or YAML file and turns them into the registry and
//! standard table the engine runs on. Loaded once at startup.

use ::config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use validator::Validate;

use crate::error::ConfigError;
use crate::parameters::{Parameter, ParameterRegistry, ValueRange};
use crate::standards::{Standard, StandardTable};

/// A parameter declared in the reference file
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ParameterSpec {
    #[validate(length(min = 1, max = 64, message = "Parameter name must be 1-64 characters"))]
    pub name: String,

    #[validate(length(min = 1, message = "Unit must not be empty"))]
    pub unit: String,

    #[serde(default)]
    #[validate(range(min = 0.0, message = "Ideal value must be non-negative"))]
    pub ideal_value: f64,

    #[validate(range(min = 0.0, message = "Range minimum must be non-negative"))]
    pub min: f64,

    pub max: f64,
}

/// One `(standard, parameter)` limit
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LimitEntry {
    #[validate(length(min = 1, message = "Standard id must not be empty"))]
    pub standard_id: String,

    #[validate(length(min = 1, message = "Parameter name must not be empty"))]
    pub parameter_name: String,

    #[validate(range(exclusive_min = 0.0, message = "Permissible limit must be positive"))]
    pub permissible_limit: f64,

    /// Overrides the registry's ideal value under this standard
    #[serde(default)]
    pub ideal_value: Option<f64>,
}

/// Contents of a reference file
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReferenceConfig {
    /// Empty means the built-in parameter set
    #[serde(default)]
    #[validate(nested)]
    pub parameters: Vec<ParameterSpec>,

    #[validate(length(min = 1, message = "At least one limit is required"))]
    #[validate(nested)]
    pub limits: Vec<LimitEntry>,
}

impl ReferenceConfig {
    /// Load from `path`; the format follows the file extension.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        info!(path = %path, "Loading reference data");
        let config = Config::builder()
            .add_source(File::with_name(path))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::deserialize_checked(config)
    }

    /// Parse reference data held in memory
    pub fn parse(content: &str, format: FileFormat) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(content, format))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::deserialize_checked(config)
    }

    fn deserialize_checked(config: Config) -> Result<Self, ConfigError> {
        let reference: ReferenceConfig = config
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        if let Err(errors) = reference.validate() {
            warn!(errors = %errors, "Reference data validation failed");
            return Err(ConfigError::InvalidReference(errors.to_string()));
        }
        Ok(reference)
    }

    /// Build the parameter registry and standard table.
    ///
    /// Every limit must name a registered parameter and each
    /// `(standard, parameter)` pair may appear once.
    pub fn into_tables(self) -> Result<(ParameterRegistry, StandardTable), ConfigError> {
        let registry = if self.parameters.is_empty() {
            ParameterRegistry::with_defaults()
        } else {
            let mut registry = ParameterRegistry::new();
            for declared in self.parameters {
                let parameter = Parameter::new(declared.name, declared.unit, ValueRange::new(declared.min, declared.max))
                    .with_ideal(declared.ideal_value);
                registry
                    .register(parameter)
                    .map_err(|e| ConfigError::InvalidReference(e.to_string()))?;
            }
            registry
        };

        let mut grouped: BTreeMap<String, Standard> = BTreeMap::new();
        for entry in self.limits {
            if !registry.contains(&entry.parameter_name) {
                return Err(ConfigError::UnknownParameter {
                    standard: entry.standard_id,
                    parameter: entry.parameter_name,
                });
            }
            let standard = grouped
                .entry(entry.standard_id.clone())
                .or_insert_with(|| Standard::new(entry.standard_id.clone()));
            if standard.covers(&entry.parameter_name) {
                return Err(ConfigError::InvalidReference(format!(
                    "duplicate limit for {} under {}",
                    entry.parameter_name, entry.standard_id
                )));
            }
            standard.set_entry(&entry.parameter_name, entry.permissible_limit, entry.ideal_value);
        }

        let mut standards = StandardTable::new();
        for (_, standard) in grouped {
            standards.insert(standard)?;
        }

        info!(
            parameters = registry.len(),
            standards = standards.ids().len(),
            "Reference data loaded"
        );
        Ok((registry, standards))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REFERENCE_JSON: &str = r#"{
        "limits": [
            { "standard_id": "STATE", "parameter_name": "lead", "permissible_limit": 0.015 },
            { "standard_id": "STATE", "parameter_name": "pH", "permissible_limit": 8.5, "ideal_value": 7.0 },
            { "standard_id": "WHO", "parameter_name": "lead", "permissible_limit": 0.01 }
        ]
    }"#;

    #[test]
    fn test_parse_and_build_tables() {
        let reference = ReferenceConfig::parse(REFERENCE_JSON, FileFormat::Json).unwrap();
        assert_eq!(reference.limits.len(), 3);

        let (registry, standards) = reference.into_tables().unwrap();
        assert!(registry.contains("lead"));
        assert_eq!(standards.ids(), vec!["STATE", "WHO"]);
        assert_eq!(standards.limit_for("STATE", "lead").unwrap(), 0.015);
        assert_eq!(standards.get("STATE").unwrap().ideal_override("pH"), Some(7.0));
        assert!(standards.limit_for("WHO", "pH").is_err());
    }

    #[test]
    fn test_custom_parameters() {
        let toml = r#"
            [[parameters]]
            name = "uranium"
            unit = "mg/L"
            min = 0.0
            max = 5.0

            [[limits]]
            standard_id = "WHO"
            parameter_name = "uranium"
            permissible_limit = 0.03
        "#;
        let (registry, standards) = ReferenceConfig::parse(toml, FileFormat::Toml)
            .unwrap()
            .into_tables()
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(standards.limit_for("WHO", "uranium").unwrap(), 0.03);
    }

    #[test]
    fn test_unknown_parameter_in_limits() {
        let json = r#"{ "limits": [
            { "standard_id": "WHO", "parameter_name": "unobtainium", "permissible_limit": 1.0 }
        ] }"#;
        let err = ReferenceConfig::parse(json, FileFormat::Json)
            .unwrap()
            .into_tables()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownParameter { .. }));
    }

    #[test]
    fn test_rejects_non_positive_limit() {
        let json = r#"{ "limits": [
            { "standard_id": "WHO", "parameter_name": "lead", "permissible_limit": 0.0 }
        ] }"#;
        assert!(matches!(
            ReferenceConfig::parse(json, FileFormat::Json),
            Err(ConfigError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_limit() {
        let json = r#"{ "limits": [
            { "standard_id": "WHO", "parameter_name": "lead", "permissible_limit": 0.01 },
            { "standard_id": "WHO", "parameter_name": "lead", "permissible_limit": 0.02 }
        ] }"#;
        let err = ReferenceConfig::parse(json, FileFormat::Json)
            .unwrap()
            .into_tables()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidReference(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("gwqi-reference-{}.json", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(REFERENCE_JSON.as_bytes()).unwrap();

        let reference = ReferenceConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(reference.limits.len(), 3);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ReferenceConfig::load("/nonexistent/gwqi-reference"),
            Err(ConfigError::Load(_))
        ));
    }
}
