//! Quality band classification
//!
//! Bands are data: an ordered, contiguous table covering `[0, +inf)`. A value
//! sitting exactly on a threshold belongs to the band that starts there.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ValidationError;

/// One labelled range of index values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationBand {
    pub label: String,
    /// Inclusive
    pub lower_bound: f64,
    /// Exclusive; `+inf` (serialized as `null`) for the top band
    #[serde(with = "unbounded", default = "unbounded::infinity")]
    pub upper_bound: f64,
    /// Ascending with worsening quality
    pub severity_rank: u32,
    /// Map marker colour hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ClassificationBand {
    pub fn new(label: impl Into<String>, lower_bound: f64, upper_bound: f64, severity_rank: u32) -> Self {
        Self {
            label: label.into(),
            lower_bound,
            upper_bound,
            severity_rank,
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_bound && value < self.upper_bound
    }
}

mod unbounded {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn infinity() -> f64 {
        f64::INFINITY
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// Validated band table of one index definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ClassificationBand>", into = "Vec<ClassificationBand>")]
pub struct BandTable {
    bands: Vec<ClassificationBand>,
}

impl BandTable {
    /// Validate and wrap a band list.
    ///
    /// Bands must be sorted, contiguous, non-overlapping, start at 0, end at
    /// `+inf` and carry strictly ascending severity ranks.
    pub fn new(bands: Vec<ClassificationBand>) -> Result<Self, ValidationError> {
        let malformed = |msg: String| Err(ValidationError::MalformedBands(msg));

        let (first, last) = match (bands.first(), bands.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return malformed("at least one band is required".to_string()),
        };

        if first.lower_bound != 0.0 {
            return malformed(format!(
                "first band '{}' must start at 0, starts at {}",
                first.label, first.lower_bound
            ));
        }
        if last.upper_bound != f64::INFINITY {
            return malformed(format!("last band '{}' must be unbounded", last.label));
        }

        let mut labels = HashSet::new();
        for band in &bands {
            if band.label.trim().is_empty() {
                return malformed("band labels must not be empty".to_string());
            }
            if !labels.insert(band.label.as_str()) {
                return malformed(format!("label '{}' is used twice", band.label));
            }
            if !band.lower_bound.is_finite() || band.upper_bound.is_nan() || band.lower_bound >= band.upper_bound {
                return malformed(format!(
                    "band '{}' has an empty or invalid range [{}, {})",
                    band.label, band.lower_bound, band.upper_bound
                ));
            }
        }

        for pair in bands.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if lower.upper_bound != upper.lower_bound {
                return malformed(format!(
                    "bands '{}' and '{}' are not contiguous ({} vs {})",
                    lower.label, upper.label, lower.upper_bound, upper.lower_bound
                ));
            }
            if upper.severity_rank <= lower.severity_rank {
                return malformed(format!(
                    "severity of '{}' must be greater than '{}'",
                    upper.label, lower.label
                ));
            }
        }

        Ok(Self { bands })
    }

    /// Band containing `value`.
    ///
    /// Values below the lowest bound fall into the first band and `+inf` into
    /// the top band, so every non-NaN value classifies.
    pub fn classify(&self, value: f64) -> Option<&ClassificationBand> {
        if value.is_nan() {
            return None;
        }
        let first = self.bands.first()?;
        if value < first.lower_bound {
            return Some(first);
        }
        self.bands
            .iter()
            .find(|band| band.contains(value))
            .or_else(|| self.bands.last())
    }

    pub fn bands(&self) -> &[ClassificationBand] {
        &self.bands
    }

    /// Default HPI table, thresholds 25/50/75/100
    pub fn hpi_default() -> Self {
        Self {
            bands: vec![
                ClassificationBand::new("Excellent", 0.0, 25.0, 0).with_color("#10B981"),
                ClassificationBand::new("Good", 25.0, 50.0, 1).with_color("#059669"),
                ClassificationBand::new("Fair", 50.0, 75.0, 2).with_color("#F59E0B"),
                ClassificationBand::new("Poor", 75.0, 100.0, 3).with_color("#F97316"),
                ClassificationBand::new("Very Poor", 100.0, f64::INFINITY, 4).with_color("#EF4444"),
            ],
        }
    }

    /// Default HEI table: low < 10 <= medium < 20 <= high
    pub fn hei_default() -> Self {
        Self {
            bands: vec![
                ClassificationBand::new("Low", 0.0, 10.0, 0).with_color("#10B981"),
                ClassificationBand::new("Medium", 10.0, 20.0, 2).with_color("#F59E0B"),
                ClassificationBand::new("High", 20.0, f64::INFINITY, 4).with_color("#EF4444"),
            ],
        }
    }

    /// Default Cd table: low < 1 <= medium < 3 <= high
    pub fn cd_default() -> Self {
        Self {
            bands: vec![
                ClassificationBand::new("Low", 0.0, 1.0, 0).with_color("#10B981"),
                ClassificationBand::new("Medium", 1.0, 3.0, 2).with_color("#F59E0B"),
                ClassificationBand::new("High", 3.0, f64::INFINITY, 4).with_color("#EF4444"),
            ],
        }
    }
}

impl TryFrom<Vec<ClassificationBand>> for BandTable {
    type Error = ValidationError;

    fn try_from(bands: Vec<ClassificationBand>) -> Result<Self, Self::Error> {
        BandTable::new(bands)
    }
}

impl From<BandTable> for Vec<ClassificationBand> {
    fn from(table: BandTable) -> Self {
        table.bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(table: &BandTable, value: f64) -> &str {
        table.classify(value).map(|b| b.label.as_str()).unwrap_or("<none>")
    }

    #[test]
    fn test_defaults_are_valid() {
        for table in [BandTable::hpi_default(), BandTable::hei_default(), BandTable::cd_default()] {
            assert!(BandTable::new(table.bands().to_vec()).is_ok());
        }
    }

    #[test]
    fn test_classify_hpi() {
        let table = BandTable::hpi_default();
        assert_eq!(label(&table, 13.33), "Excellent");
        assert_eq!(label(&table, 42.8), "Good");
        assert_eq!(label(&table, 68.2), "Fair");
        assert_eq!(label(&table, 85.6), "Poor");
        assert_eq!(label(&table, 950.0), "Very Poor");
    }

    #[test]
    fn test_boundary_goes_to_higher_band() {
        let table = BandTable::hpi_default();
        assert_eq!(label(&table, 0.0), "Excellent");
        assert_eq!(label(&table, 25.0), "Good");
        assert_eq!(label(&table, 50.0), "Fair");
        assert_eq!(label(&table, 75.0), "Poor");
        assert_eq!(label(&table, 100.0), "Very Poor");
        assert_eq!(label(&table, 24.999_999), "Excellent");
    }

    #[test]
    fn test_classification_is_total() {
        let table = BandTable::cd_default();
        for value in [0.0, 0.5, 1.0, 2.9, 3.0, 1e12, f64::MAX, f64::INFINITY] {
            assert!(table.classify(value).is_some(), "{}", value);
        }
        // Signed Cd below zero still resolves
        assert_eq!(label(&table, -4.2), "Low");
        assert!(table.classify(f64::NAN).is_none());
    }

    #[test]
    fn test_rejects_gap() {
        let bands = vec![
            ClassificationBand::new("A", 0.0, 10.0, 0),
            ClassificationBand::new("B", 11.0, f64::INFINITY, 1),
        ];
        assert!(matches!(BandTable::new(bands), Err(ValidationError::MalformedBands(_))));
    }

    #[test]
    fn test_rejects_overlap_and_bad_start() {
        let overlap = vec![
            ClassificationBand::new("A", 0.0, 10.0, 0),
            ClassificationBand::new("B", 5.0, f64::INFINITY, 1),
        ];
        assert!(BandTable::new(overlap).is_err());

        let bad_start = vec![ClassificationBand::new("A", 1.0, f64::INFINITY, 0)];
        assert!(BandTable::new(bad_start).is_err());
    }

    #[test]
    fn test_rejects_bounded_top_and_empty() {
        assert!(BandTable::new(vec![]).is_err());
        assert!(BandTable::new(vec![ClassificationBand::new("A", 0.0, 10.0, 0)]).is_err());
    }

    #[test]
    fn test_rejects_non_ascending_severity() {
        let bands = vec![
            ClassificationBand::new("A", 0.0, 10.0, 2),
            ClassificationBand::new("B", 10.0, f64::INFINITY, 2),
        ];
        assert!(BandTable::new(bands).is_err());
    }

    #[test]
    fn test_serde_unbounded_top() {
        let json = serde_json::to_value(BandTable::cd_default()).unwrap();
        assert!(json[2]["upper_bound"].is_null());

        let parsed: BandTable = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, BandTable::cd_default());
    }

    #[test]
    fn test_serde_rejects_malformed() {
        let json = serde_json::json!([
            { "label": "A", "lower_bound": 0.0, "upper_bound": 5.0, "severity_rank": 0 }
        ]);
        assert!(serde_json::from_value::<BandTable>(json).is_err());
    }
}
