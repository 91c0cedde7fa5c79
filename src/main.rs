//! Groundwater Water Quality Index (GWQI) batch driver
//!
//! Loads reference data and samples, computes the active indices for every
//! sample and writes the JSON report to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gwqi::config::Settings;
use gwqi::error::{EngineError, ErrorReport};
use gwqi::fake_samples::SampleGenerator;
use gwqi::reference::ReferenceConfig;
use gwqi::validation::validate_samples;
use gwqi::{DefinitionCatalog, IndexEngine, ParameterRegistry, Sample, SampleInput, StandardTable};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,gwqi=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;

    info!(
        standard = %settings.compute.standard_id,
        workers = settings.compute.workers,
        "Starting GWQI batch"
    );

    let (registry, standards) = match &settings.sources.reference_path {
        Some(path) => ReferenceConfig::load(path)
            .and_then(ReferenceConfig::into_tables)
            .with_context(|| format!("Failed to load reference data from {}", path))?,
        None => (ParameterRegistry::with_defaults(), StandardTable::with_defaults()),
    };

    let samples = load_samples(&settings, &registry)?;

    let engine = IndexEngine::new(registry, standards).with_options(settings.compute.batch_options());

    // Shared the same way an authoring front end would hold it
    let catalog = Arc::new(RwLock::new(DefinitionCatalog::with_builtins()));
    let definitions = catalog.read().await.active();

    match engine
        .compute_indices_parallel(
            samples,
            &settings.compute.standard_id,
            &definitions,
            settings.compute.workers,
        )
        .await
    {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{}", json);
            info!(
                results = report.results.len(),
                failures = report.summary.failure_count,
                "GWQI batch finished"
            );
            Ok(())
        }
        Err(err) => {
            let report = ErrorReport::from(&err);
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize error report")?
            );
            Err(fatal(err))
        }
    }
}

fn load_samples(settings: &Settings, registry: &ParameterRegistry) -> Result<Vec<Sample>> {
    match &settings.sources.samples_path {
        Some(path) => {
            let content =
                std::fs::read_to_string(path).with_context(|| format!("Failed to read samples from {}", path))?;
            let inputs: Vec<SampleInput> =
                serde_json::from_str(&content).with_context(|| format!("Invalid samples file {}", path))?;
            let samples = validate_samples(inputs, registry).context("Sample validation failed")?;
            info!(path = %path, count = samples.len(), "Loaded samples");
            Ok(samples)
        }
        None => {
            let count = settings.sources.synthetic_samples;
            info!(count = count, "No samples file configured, generating synthetic samples");
            Ok(SampleGenerator::new(5).generate(count))
        }
    }
}

fn fatal(err: EngineError) -> anyhow::Error {
    error!(error = %err, error_type = err.error_type(), "GWQI batch failed");
    anyhow::Error::new(err).context("Batch computation failed")
}
