//! Synthetic Sample Generator
//!
//! Produces realistic groundwater samples for demos and tests, standing in for
//! the ingestion pipeline. Each monitoring well carries its own contamination
//! level so that a batch spreads across the quality bands instead of
//! clustering in one.
//!
//! Concentrations are drawn around typical groundwater values with Gaussian
//! noise, clamped to the physical range and rounded to laboratory precision.

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::{debug, info};

use crate::models::Sample;
use crate::parameters::HEAVY_METALS;

/// (parameter, typical value, standard deviation, upper clamp)
const BASELINES: &[(&str, f64, f64, f64)] = &[
    ("pH", 7.2, 0.4, 14.0),
    ("TDS", 450.0, 120.0, 5_000.0),
    ("hardness", 220.0, 60.0, 2_000.0),
    ("chloride", 120.0, 40.0, 2_000.0),
    ("fluoride", 0.8, 0.3, 10.0),
    ("nitrate", 20.0, 10.0, 500.0),
    ("sulfate", 90.0, 30.0, 2_000.0),
    ("iron", 0.15, 0.08, 10.0),
    ("manganese", 0.08, 0.04, 10.0),
    ("lead", 0.004, 0.002, 1.0),
    ("cadmium", 0.001, 0.0005, 1.0),
    ("arsenic", 0.004, 0.002, 1.0),
    ("chromium", 0.02, 0.01, 1.0),
    ("mercury", 0.001, 0.0005, 1.0),
    ("nickel", 0.02, 0.01, 1.0),
    ("zinc", 1.0, 0.5, 50.0),
    ("copper", 0.4, 0.2, 50.0),
];

/// Generator of synthetic well samples
pub struct SampleGenerator {
    rng: StdRng,
    /// Heavy-metal multiplier per well
    well_factors: Vec<f64>,
    /// Probability that a parameter is left out of a sample
    missing_rate: f64,
    /// Samples produced so far
    produced: u64,
}

impl SampleGenerator {
    /// Generator seeded from OS entropy
    pub fn new(wells: usize) -> Self {
        Self::from_rng(StdRng::from_entropy(), wells)
    }

    /// Reproducible generator over five wells
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), 5)
    }

    fn from_rng(mut rng: StdRng, wells: usize) -> Self {
        let wells = wells.max(1);
        // Most wells are clean, some are heavily affected
        let well_factors = (0..wells)
            .map(|_| {
                let z: f64 = rng.sample(StandardNormal);
                (1.0 + z.abs() * 2.5).min(20.0)
            })
            .collect();

        info!(wells = wells, "Initializing synthetic sample generator");

        Self {
            rng,
            well_factors,
            missing_rate: 0.0,
            produced: 0,
        }
    }

    /// Leave parameters out at the given rate, to exercise partial failures
    pub fn with_missing_rate(mut self, rate: f64) -> Self {
        self.missing_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn wells(&self) -> usize {
        self.well_factors.len()
    }

    /// Generate `count` samples, cycling over the wells
    pub fn generate(&mut self, count: usize) -> Vec<Sample> {
        (0..count).map(|_| self.next_sample()).collect()
    }

    /// Generate a single sample
    pub fn next_sample(&mut self) -> Sample {
        self.produced += 1;
        let well = ((self.produced - 1) % self.well_factors.len() as u64) as usize;
        let factor = self.well_factors[well];

        let mut parameters = Vec::with_capacity(BASELINES.len());
        for &(name, typical, sd, max) in BASELINES {
            if self.missing_rate > 0.0 && self.rng.gen::<f64>() < self.missing_rate {
                continue;
            }
            let noise: f64 = self.rng.sample(StandardNormal);
            let scale = if HEAVY_METALS.contains(&name) { factor } else { 1.0 };
            let value = ((typical + noise * sd) * scale).clamp(0.0, max);
            parameters.push((name.to_string(), round_to_precision(name, value)));
        }

        let mut sample = Sample::new(
            format!("S-{:04}", self.produced),
            format!("Well-{:03}", well + 1),
            parameters,
        );
        // One sampling round per day
        sample.timestamp = Utc::now() - Duration::days(((self.produced - 1) / self.well_factors.len() as u64) as i64);

        debug!(
            sample_id = %sample.id,
            location = %sample.location_id,
            well_factor = factor,
            parameters = sample.parameters.len(),
            "Generated synthetic sample"
        );

        sample
    }
}

/// Laboratory reporting precision
fn round_to_precision(name: &str, value: f64) -> f64 {
    let scale = if HEAVY_METALS.contains(&name) {
        10_000.0
    } else if name == "pH" {
        100.0
    } else {
        10.0
    };
    (value * scale).round() / scale
}
