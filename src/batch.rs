//! Batch aggregation
//!
//! Runs the calculator and classifier over a sample collection and rolls the
//! results up per index. A failure on one sample never stops the batch; it is
//! recorded on that sample's result and counted in the summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::calculator::{IndexCalculator, DEFAULT_WEIGHT_CONSTANT};
use crate::catalog::IndexDefinition;
use crate::error::ConfigError;
use crate::models::{DefinitionState, IndexResult, Sample};
use crate::parameters::ParameterRegistry;
use crate::standards::{Standard, StandardTable};

/// Default severity rank counted as "at risk" in summaries
pub const DEFAULT_SEVERITY_THRESHOLD: u32 = 3;

/// Knobs shared by every sample of a batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    /// `k` in `Wi = k / Si`
    pub weight_constant: f64,
    /// Summaries report the share of samples at or above this rank
    pub severity_threshold: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            weight_constant: DEFAULT_WEIGHT_CONSTANT,
            severity_threshold: DEFAULT_SEVERITY_THRESHOLD,
        }
    }
}

/// Definitions a batch will run, after preflight
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub definitions: Vec<Arc<IndexDefinition>>,
    /// Names of deprecated definitions left out
    pub skipped: Vec<String>,
}

/// Check the batch can run at all.
///
/// Fails if the standard is unknown, a definition is still a draft, or a
/// definition uses a parameter the standard has no limit for. Deprecated
/// definitions are dropped with a warning.
pub fn preflight(
    standards: &StandardTable,
    standard_id: &str,
    definitions: &[Arc<IndexDefinition>],
) -> Result<BatchPlan, ConfigError> {
    let standard = standards.get(standard_id)?;
    let mut plan = BatchPlan {
        definitions: Vec::with_capacity(definitions.len()),
        skipped: Vec::new(),
    };

    for definition in definitions {
        match definition.state {
            DefinitionState::Deprecated => {
                warn!(index = %definition.name, "Skipping deprecated index definition");
                plan.skipped.push(definition.name.clone());
                continue;
            }
            DefinitionState::Draft => {
                return Err(ConfigError::DefinitionNotValidated(definition.name.clone()));
            }
            DefinitionState::Validated | DefinitionState::Saved => {}
        }

        check_coverage(standard, definition)?;
        plan.definitions.push(Arc::clone(definition));
    }

    Ok(plan)
}

fn check_coverage(standard: &Standard, definition: &IndexDefinition) -> Result<(), ConfigError> {
    match definition.parameters.iter().find(|p| !standard.covers(p)) {
        Some(parameter) => Err(ConfigError::MissingLimit {
            definition: definition.name.clone(),
            standard: standard.id.clone(),
            parameter: parameter.clone(),
        }),
        None => Ok(()),
    }
}

/// Evaluate every definition on every sample.
///
/// Results are sample-major in input order, definition-minor in plan order.
pub fn compute_batch(
    registry: &ParameterRegistry,
    standard: &Standard,
    definitions: &[Arc<IndexDefinition>],
    samples: &[Sample],
    options: &BatchOptions,
) -> Vec<IndexResult> {
    let calculator =
        IndexCalculator::new(registry, standard).with_weight_constant(options.weight_constant);
    let mut results = Vec::with_capacity(samples.len() * definitions.len());

    for sample in samples {
        let computed_at = Utc::now();
        for definition in definitions {
            let result = calculator.index_result(definition, sample, computed_at);
            if let Some(err) = result.value.as_error() {
                debug!(
                    sample_id = %sample.id,
                    index = %definition.name,
                    error = %err,
                    "Index computation failed for sample"
                );
            }
            results.push(result);
        }
    }

    results
}

/// Sample count for one band of one index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandCount {
    pub label: String,
    pub severity_rank: u32,
    pub count: usize,
}

/// Roll-up of one index over a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSummary {
    pub index_name: String,
    /// Samples with a numeric value
    pub computed: usize,
    /// Samples carrying an error marker
    pub failed: usize,
    pub failures_by_kind: BTreeMap<String, usize>,
    /// Every band of the definition, lowest severity first
    pub band_counts: Vec<BandCount>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub severity_threshold: u32,
    /// Share of computed samples with `severity_rank >= severity_threshold`
    pub at_or_above_threshold_pct: Option<f64>,
}

/// Whole-batch summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub standard_id: String,
    pub sample_count: usize,
    pub failure_count: usize,
    pub indices: Vec<IndexSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_definitions: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn index(&self, name: &str) -> Option<&IndexSummary> {
        self.indices.iter().find(|s| s.index_name == name)
    }
}

/// Results plus summary, handed to reporting/map collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub results: Vec<IndexResult>,
    pub summary: BatchSummary,
}

fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Summarize one index over its results
pub fn summarize_index(
    definition: &IndexDefinition,
    results: &[&IndexResult],
    severity_threshold: u32,
) -> IndexSummary {
    let mut values = Vec::with_capacity(results.len());
    let mut failures_by_kind = BTreeMap::new();
    let mut band_counts: Vec<BandCount> = definition
        .bands
        .bands()
        .iter()
        .map(|band| BandCount {
            label: band.label.clone(),
            severity_rank: band.severity_rank,
            count: 0,
        })
        .collect();
    let mut classified = 0usize;
    let mut at_risk = 0usize;

    for result in results {
        if let Some(err) = result.value.as_error() {
            *failures_by_kind.entry(err.kind().to_string()).or_insert(0) += 1;
            continue;
        }
        if let Some(value) = result.value.as_value() {
            values.push(value);
        }
        if let Some(band) = &result.band {
            classified += 1;
            if band.severity_rank >= severity_threshold {
                at_risk += 1;
            }
            if let Some(entry) = band_counts.iter_mut().find(|c| c.label == band.label) {
                entry.count += 1;
            }
        }
    }

    values.sort_by(f64::total_cmp);
    let failed = failures_by_kind.values().sum();
    let mean = if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    };
    let pct = if classified == 0 {
        None
    } else {
        Some(at_risk as f64 / classified as f64 * 100.0)
    };

    IndexSummary {
        index_name: definition.name.clone(),
        computed: values.len(),
        failed,
        failures_by_kind,
        band_counts,
        mean,
        median: median(&values),
        min: values.first().copied(),
        max: values.last().copied(),
        severity_threshold,
        at_or_above_threshold_pct: pct,
    }
}

/// Build the batch summary from materialized results.
///
/// `results` must be in [`compute_batch`] order over `plan.definitions`.
pub fn summarize(
    standard_id: &str,
    plan: &BatchPlan,
    samples: &[Sample],
    results: &[IndexResult],
    options: &BatchOptions,
) -> BatchSummary {
    // Results are sample-major, so each definition owns every n-th slot
    let stride = plan.definitions.len();
    let indices: Vec<IndexSummary> = plan
        .definitions
        .iter()
        .enumerate()
        .map(|(slot, definition)| {
            let own: Vec<&IndexResult> = results.iter().skip(slot).step_by(stride).collect();
            summarize_index(definition, &own, options.severity_threshold)
        })
        .collect();

    let failure_count = indices.iter().map(|s| s.failed).sum();

    info!(
        standard = %standard_id,
        samples = samples.len(),
        indices = indices.len(),
        failures = failure_count,
        "Batch summarized"
    );

    BatchSummary {
        standard_id: standard_id.to_string(),
        sample_count: samples.len(),
        failure_count,
        indices,
        skipped_definitions: plan.skipped.clone(),
        computed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DefinitionCatalog;
    use crate::classifier::BandTable;
    use crate::error::ComputationError;
    use crate::models::IndexValue;

    fn sample(id: &str, values: &[(&str, f64)]) -> Sample {
        Sample::new(id, "Well-001", values.iter().map(|(k, v)| (k.to_string(), *v)))
    }

    fn hei_lead_zinc() -> Arc<IndexDefinition> {
        Arc::new(IndexDefinition::hei(&["lead", "zinc"]))
    }

    fn five_samples() -> Vec<Sample> {
        vec![
            sample("S-1", &[("lead", 0.005), ("zinc", 1.5)]),
            sample("S-2", &[("lead", 0.010), ("zinc", 3.0)]),
            sample("S-3", &[("lead", 0.020)]),
            sample("S-4", &[("lead", 0.030), ("zinc", 6.0)]),
            sample("S-5", &[("lead", 0.001), ("zinc", 0.3)]),
        ]
    }

    #[test]
    fn test_partial_failure() {
        let registry = ParameterRegistry::with_defaults();
        let table = StandardTable::with_defaults();
        let definitions = vec![hei_lead_zinc()];
        let plan = preflight(&table, "WHO", &definitions).unwrap();
        let samples = five_samples();
        let options = BatchOptions::default();

        let results = compute_batch(&registry, table.get("WHO").unwrap(), &plan.definitions, &samples, &options);
        assert_eq!(results.len(), 5);
        let ids: Vec<&str> = results.iter().map(|r| r.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["S-1", "S-2", "S-3", "S-4", "S-5"]);

        assert_eq!(
            results[2].value,
            IndexValue::Error(ComputationError::MissingParameter("zinc".to_string()))
        );
        assert!(results[2].band.is_none());

        let summary = summarize("WHO", &plan, &samples, &results, &options);
        let hei = summary.index("HEI").unwrap();
        assert_eq!(hei.computed, 4);
        assert_eq!(hei.failed, 1);
        assert_eq!(hei.failures_by_kind.get("missing_parameter"), Some(&1));
        assert_eq!(summary.failure_count, 1);

        // HEI: 1.0, 2.0, 5.0, 0.2 (S-3 excluded)
        let expected_mean = (1.0 + 2.0 + 5.0 + 0.2) / 4.0;
        assert!((hei.mean.unwrap() - expected_mean).abs() < 1e-9);
        assert!((hei.median.unwrap() - 1.5).abs() < 1e-9);
        assert!((hei.min.unwrap() - 0.2).abs() < 1e-9);
        assert!((hei.max.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_band_counts_and_threshold_share() {
        let registry = ParameterRegistry::with_defaults();
        let table = StandardTable::with_defaults();
        let definitions = vec![Arc::new(IndexDefinition::hpi(&["lead"]))];
        let plan = preflight(&table, "WHO", &definitions).unwrap();
        // HPI with one parameter is Qi = Mi / 0.01 * 100
        let samples = vec![
            sample("A", &[("lead", 0.001)]),  // 10   Excellent
            sample("B", &[("lead", 0.0025)]), // 25   Good (boundary)
            sample("C", &[("lead", 0.008)]),  // 80   Poor
            sample("D", &[("lead", 0.02)]),   // 200  Very Poor
        ];
        let options = BatchOptions::default();

        let results = compute_batch(&registry, table.get("WHO").unwrap(), &plan.definitions, &samples, &options);
        let summary = summarize("WHO", &plan, &samples, &results, &options);
        let hpi = summary.index("HPI").unwrap();

        let counts: Vec<(&str, usize)> = hpi.band_counts.iter().map(|c| (c.label.as_str(), c.count)).collect();
        assert_eq!(
            counts,
            vec![("Excellent", 1), ("Good", 1), ("Fair", 0), ("Poor", 1), ("Very Poor", 1)]
        );
        assert!((hpi.at_or_above_threshold_pct.unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_preflight_unknown_standard() {
        let table = StandardTable::with_defaults();
        assert_eq!(
            preflight(&table, "EPA", &[hei_lead_zinc()]).unwrap_err(),
            ConfigError::UnknownStandard("EPA".to_string())
        );
    }

    #[test]
    fn test_preflight_missing_limit() {
        let mut table = StandardTable::new();
        table
            .insert(Standard::new("State").with_limit("lead", 0.01))
            .unwrap();
        assert!(matches!(
            preflight(&table, "State", &[hei_lead_zinc()]),
            Err(ConfigError::MissingLimit { .. })
        ));
    }

    #[test]
    fn test_preflight_rejects_draft_and_skips_deprecated() {
        let registry = ParameterRegistry::with_defaults();
        let table = StandardTable::with_defaults();
        let mut catalog = DefinitionCatalog::with_builtins();
        let bands = BandTable::hpi_default().bands().to_vec();

        let draft = catalog
            .create_definition("Draft", "lead", vec!["lead".to_string()], None, bands.clone())
            .unwrap();
        assert!(matches!(
            preflight(&table, "WHO", &[catalog.get(draft).unwrap()]),
            Err(ConfigError::DefinitionNotValidated(_))
        ));

        let old = catalog
            .create_definition("Old", "lead", vec!["lead".to_string()], None, bands)
            .unwrap();
        catalog.validate(old, &registry, &table, "WHO").unwrap();
        catalog.save(old).unwrap();
        catalog.deprecate(old).unwrap();

        let mut definitions = catalog.active();
        definitions.push(catalog.get(old).unwrap());
        let plan = preflight(&table, "WHO", &definitions).unwrap();
        assert_eq!(plan.definitions.len(), 3);
        assert_eq!(plan.skipped, vec!["Old".to_string()]);
    }

    #[test]
    fn test_empty_batch() {
        let registry = ParameterRegistry::with_defaults();
        let table = StandardTable::with_defaults();
        let plan = preflight(&table, "WHO", &[hei_lead_zinc()]).unwrap();
        let options = BatchOptions::default();

        let results = compute_batch(&registry, table.get("WHO").unwrap(), &plan.definitions, &[], &options);
        assert!(results.is_empty());

        let summary = summarize("WHO", &plan, &[], &results, &options);
        let hei = summary.index("HEI").unwrap();
        assert_eq!(hei.computed, 0);
        assert_eq!(hei.mean, None);
        assert_eq!(hei.median, None);
        assert_eq!(hei.at_or_above_threshold_pct, None);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_same_name_definitions_summarized_apart() {
        let registry = ParameterRegistry::with_defaults();
        let table = StandardTable::with_defaults();
        let definitions = vec![
            Arc::new(IndexDefinition::hpi(&["lead"])),
            Arc::new(IndexDefinition::hpi(&["zinc"])),
        ];
        let plan = preflight(&table, "WHO", &definitions).unwrap();
        let samples = vec![
            sample("A", &[("lead", 0.005), ("zinc", 0.75)]),
            sample("B", &[("lead", 0.005)]),
        ];
        let options = BatchOptions::default();

        let results = compute_batch(&registry, table.get("WHO").unwrap(), &plan.definitions, &samples, &options);
        let summary = summarize("WHO", &plan, &samples, &results, &options);

        assert_eq!(summary.indices.len(), 2);
        let (lead, zinc) = (&summary.indices[0], &summary.indices[1]);
        assert_eq!((lead.computed, lead.failed), (2, 0));
        assert_eq!((zinc.computed, zinc.failed), (1, 1));
        assert!((lead.mean.unwrap() - 50.0).abs() < 1e-9);
        assert!((zinc.mean.unwrap() - 25.0).abs() < 1e-9);
    }
}
