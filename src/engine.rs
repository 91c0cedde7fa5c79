//! Engine facade
//!
//! Owns the read-only parameter registry and standard table and exposes the
//! batch computation API. Cloning an engine is cheap; both tables sit behind
//! `Arc` and are never mutated after construction.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::batch::{compute_batch, preflight, summarize, BatchOptions, BatchReport};
use crate::calculator::IndexCalculator;
use crate::catalog::IndexDefinition;
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::models::{IndexResult, Sample};
use crate::parameters::ParameterRegistry;
use crate::standards::StandardTable;

#[derive(Debug, Clone)]
pub struct IndexEngine {
    parameters: Arc<ParameterRegistry>,
    standards: Arc<StandardTable>,
    options: BatchOptions,
}

impl IndexEngine {
    pub fn new(parameters: ParameterRegistry, standards: StandardTable) -> Self {
        Self {
            parameters: Arc::new(parameters),
            standards: Arc::new(standards),
            options: BatchOptions::default(),
        }
    }

    /// Engine over the built-in parameters and the WHO/BIS standards
    pub fn with_defaults() -> Self {
        Self::new(ParameterRegistry::with_defaults(), StandardTable::with_defaults())
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    pub fn standards(&self) -> &StandardTable {
        &self.standards
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Compute and classify one definition on one sample
    pub fn calculate(
        &self,
        sample: &Sample,
        standard_id: &str,
        definition: &IndexDefinition,
    ) -> EngineResult<IndexResult> {
        if !definition.state.is_computable() {
            return Err(ConfigError::DefinitionNotValidated(definition.name.clone()).into());
        }
        let standard = self.standards.get(standard_id)?;
        let calculator = IndexCalculator::new(&self.parameters, standard)
            .with_weight_constant(self.options.weight_constant);
        Ok(calculator.index_result(definition, sample, chrono::Utc::now()))
    }

    /// Evaluate `definitions` over `samples` on the calling thread.
    ///
    /// Per-sample failures land in the results; only configuration problems
    /// fail the whole batch, and then no results are produced.
    #[instrument(skip_all, fields(standard = %standard_id, samples = samples.len()))]
    pub fn compute_indices(
        &self,
        samples: &[Sample],
        standard_id: &str,
        definitions: &[Arc<IndexDefinition>],
    ) -> EngineResult<BatchReport> {
        let plan = preflight(&self.standards, standard_id, definitions)?;
        let standard = self.standards.get(standard_id)?;

        let results = compute_batch(&self.parameters, standard, &plan.definitions, samples, &self.options);
        let summary = summarize(standard_id, &plan, samples, &results, &self.options);

        info!(results = results.len(), "Batch computed");
        Ok(BatchReport { results, summary })
    }

    /// Same as [`compute_indices`](Self::compute_indices), spread over
    /// `workers` blocking tasks.
    ///
    /// Samples are split into contiguous chunks and the chunk outputs are
    /// concatenated in order, so the result order matches the sequential run.
    pub async fn compute_indices_parallel(
        &self,
        samples: Vec<Sample>,
        standard_id: &str,
        definitions: &[Arc<IndexDefinition>],
        workers: usize,
    ) -> EngineResult<BatchReport> {
        let plan = preflight(&self.standards, standard_id, definitions)?;

        let samples = Arc::new(samples);
        let workers = workers.max(1);
        let chunk_size = samples.len().div_ceil(workers).max(1);
        let chunk_count = samples.len().div_ceil(chunk_size);

        debug!(workers, chunk_size, chunk_count, "Dispatching batch chunks");

        let handles = (0..chunk_count).map(|chunk| {
            let parameters = Arc::clone(&self.parameters);
            let standards = Arc::clone(&self.standards);
            let samples = Arc::clone(&samples);
            let definitions = plan.definitions.clone();
            let options = self.options;
            let standard_id = standard_id.to_string();

            tokio::task::spawn_blocking(move || {
                let start = chunk * chunk_size;
                let end = (start + chunk_size).min(samples.len());
                let standard = standards.get(&standard_id)?;
                Ok::<_, EngineError>(compute_batch(
                    &parameters,
                    standard,
                    &definitions,
                    &samples[start..end],
                    &options,
                ))
            })
        });

        let mut results = Vec::with_capacity(samples.len() * plan.definitions.len());
        for joined in join_all(handles).await {
            let chunk = joined.map_err(|e| EngineError::Internal(format!("batch worker failed: {}", e)))??;
            results.extend(chunk);
        }

        let summary = summarize(standard_id, &plan, &samples, &results, &self.options);
        info!(results = results.len(), workers, "Parallel batch computed");
        Ok(BatchReport { results, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DefinitionCatalog;
    use crate::fake_samples::SampleGenerator;

    fn catalog_definitions() -> Vec<Arc<IndexDefinition>> {
        DefinitionCatalog::with_builtins().active()
    }

    #[test]
    fn test_compute_indices_counts() {
        let engine = IndexEngine::with_defaults();
        let samples = SampleGenerator::with_seed(7).generate(6);
        let definitions = catalog_definitions();

        let report = engine.compute_indices(&samples, "WHO", &definitions).unwrap();
        assert_eq!(report.results.len(), samples.len() * definitions.len());
        assert_eq!(report.summary.sample_count, 6);
        assert_eq!(report.summary.indices.len(), 3);
    }

    #[test]
    fn test_unknown_standard_is_fatal() {
        let engine = IndexEngine::with_defaults();
        let samples = SampleGenerator::with_seed(1).generate(3);
        let err = engine
            .compute_indices(&samples, "EPA", &catalog_definitions())
            .unwrap_err();
        assert_eq!(err, EngineError::Config(ConfigError::UnknownStandard("EPA".to_string())));
    }

    #[test]
    fn test_calculate_single_sample() {
        let engine = IndexEngine::with_defaults();
        let sample = Sample::new("S-1", "W-1", [("lead".to_string(), 0.01), ("zinc".to_string(), 3.0)]);
        let definition = IndexDefinition::hei(&["lead", "zinc"]);

        let result = engine.calculate(&sample, "WHO", &definition).unwrap();
        assert!((result.value.as_value().unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(result.band.unwrap().label, "Low");
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let engine = IndexEngine::with_defaults();
        let samples = SampleGenerator::with_seed(42).generate(17);
        let definitions = catalog_definitions();

        let sequential = engine.compute_indices(&samples, "WHO", &definitions).unwrap();
        let parallel = engine
            .compute_indices_parallel(samples.clone(), "WHO", &definitions, 4)
            .await
            .unwrap();

        let key = |r: &IndexResult| (r.sample_id.clone(), r.index_name.clone(), r.value.clone(), r.band.clone());
        let seq: Vec<_> = sequential.results.iter().map(key).collect();
        let par: Vec<_> = parallel.results.iter().map(key).collect();
        assert_eq!(seq, par);

        for (a, b) in sequential.summary.indices.iter().zip(&parallel.summary.indices) {
            assert_eq!(a.computed, b.computed);
            assert_eq!(a.failed, b.failed);
            assert_eq!(a.band_counts, b.band_counts);
        }
    }

    #[test]
    fn test_parallel_more_workers_than_samples() {
        let engine = IndexEngine::with_defaults();
        let samples = SampleGenerator::with_seed(3).generate(2);
        let definitions = catalog_definitions();

        let report =
            tokio_test::block_on(engine.compute_indices_parallel(samples, "WHO", &definitions, 8)).unwrap();

        assert_eq!(report.results.len(), 2 * 3);
        let ids: Vec<&str> = report.results.iter().map(|r| r.index_name.as_str()).collect();
        assert_eq!(ids, vec!["HPI", "HEI", "Cd", "HPI", "HEI", "Cd"]);
    }

    #[tokio::test]
    async fn test_parallel_empty_batch() {
        let engine = IndexEngine::with_defaults();
        let report = engine
            .compute_indices_parallel(Vec::new(), "BIS", &catalog_definitions(), 4)
            .await
            .unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.summary.sample_count, 0);
    }
}
