//! Configuration management module
//!
//! Loads and validates environment-based configuration for the batch driver.

use serde::Deserialize;
use std::env;
use thiserror::Error;

use crate::batch::BatchOptions;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid number format in environment variable {0}")]
    ParseError(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Where the driver reads its inputs from
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// Reference data file (JSON/TOML/YAML); built-in WHO/BIS tables when unset
    pub reference_path: Option<String>,
    /// JSON array of samples; synthetic samples when unset
    pub samples_path: Option<String>,
    /// Number of synthetic samples to generate
    pub synthetic_samples: usize,
}

/// Batch computation settings
#[derive(Debug, Clone, Deserialize)]
pub struct ComputeSettings {
    pub standard_id: String,
    /// `k` in `Wi = k / Si`
    pub weight_constant: f64,
    pub severity_threshold: u32,
    pub workers: usize,
}

impl ComputeSettings {
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            weight_constant: self.weight_constant,
            severity_threshold: self.severity_threshold,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub sources: SourceSettings,
    pub compute: ComputeSettings,
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, SettingsError> {
    env::var(name)
        .unwrap_or_else(|_| default.into())
        .trim()
        .parse()
        .map_err(|_| SettingsError::ParseError(name))
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        let weight_constant: f64 = parse_var("GWQI_WEIGHT_CONSTANT", "1.0")?;
        if !weight_constant.is_finite() || weight_constant <= 0.0 {
            return Err(SettingsError::InvalidValue(
                "GWQI_WEIGHT_CONSTANT",
                weight_constant.to_string(),
            ));
        }

        let workers: usize = parse_var("GWQI_WORKERS", "4")?;
        if workers == 0 {
            return Err(SettingsError::InvalidValue("GWQI_WORKERS", "0".into()));
        }

        Ok(Self {
            sources: SourceSettings {
                reference_path: env::var("GWQI_REFERENCE_PATH").ok().filter(|p| !p.is_empty()),
                samples_path: env::var("GWQI_SAMPLES_PATH").ok().filter(|p| !p.is_empty()),
                synthetic_samples: parse_var("GWQI_SYNTHETIC_SAMPLES", "25")?,
            },
            compute: ComputeSettings {
                standard_id: env::var("GWQI_STANDARD").unwrap_or_else(|_| "WHO".into()),
                weight_constant,
                severity_threshold: parse_var("GWQI_SEVERITY_THRESHOLD", "3")?,
                workers,
            },
        })
    }
}
