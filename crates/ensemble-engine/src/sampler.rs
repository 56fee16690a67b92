//! Monte Carlo dropout sampling.
//!
//! Each draw re-evaluates the model with random unit suppression. Draws are
//! independent, so they run data-parallel on rayon and are collected in draw
//! order. Draw `i` is seeded with `base_seed + i`, which makes a seeded run
//! reproducible regardless of thread scheduling.

use hepatic_core::{InferenceError, InferenceResult};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::classifier::LesionClassifier;
use crate::ensemble::{EnsembleSummary, PredictionEnsemble};

/// One stochastic realisation of the fibrosis ensemble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionSample {
    /// Ensemble-averaged point estimate.
    pub mean: f64,
    /// Ensemble-averaged data-noise variance.
    pub noise_variance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleSet {
    Regression(Vec<RegressionSample>),
    /// One probability vector per draw, in `LesionClass::ALL` order.
    Categorical(Vec<Vec<f64>>),
}

impl SampleSet {
    pub fn len(&self) -> usize {
        match self {
            SampleSet::Regression(samples) => samples.len(),
            SampleSet::Categorical(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of a single model evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictiveDistribution {
    Regression(EnsembleSummary),
    Categorical(Vec<f64>),
}

/// The two model families behind the common "input -> distribution" capability.
#[derive(Debug, Clone, Copy)]
pub enum ClinicalModel<'a> {
    Fibrosis(&'a PredictionEnsemble),
    Lesion(&'a LesionClassifier),
}

impl ClinicalModel<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            ClinicalModel::Fibrosis(_) => "fibrosis_ensemble",
            ClinicalModel::Lesion(_) => "lesion_classifier",
        }
    }

    pub fn input_dim(&self) -> usize {
        match self {
            ClinicalModel::Fibrosis(ensemble) => ensemble.input_dim(),
            ClinicalModel::Lesion(classifier) => classifier.input_dim(),
        }
    }

    /// Single evaluation; stochastic iff `rng` is supplied.
    pub fn predict(&self, input: &DVector<f64>, rng: Option<&mut StdRng>) -> InferenceResult<PredictiveDistribution> {
        match self {
            ClinicalModel::Fibrosis(ensemble) => {
                ensemble.predict(input, rng).map(PredictiveDistribution::Regression)
            }
            ClinicalModel::Lesion(classifier) => classifier
                .probabilities(input, rng)
                .map(PredictiveDistribution::Categorical),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct McDropoutSampler {
    seed: Option<u64>,
}

impl McDropoutSampler {
    /// `None` draws a fresh base seed for every run.
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    /// Run `num_samples` stochastic evaluations. Any failing draw aborts the
    /// whole run; no partial sample set is ever returned.
    pub fn sample(
        &self,
        model: ClinicalModel<'_>,
        input: &DVector<f64>,
        num_samples: usize,
    ) -> InferenceResult<SampleSet> {
        match model {
            ClinicalModel::Fibrosis(ensemble) => self
                .sample_regression(ensemble, input, num_samples)
                .map(SampleSet::Regression),
            ClinicalModel::Lesion(classifier) => self
                .sample_categorical(classifier, input, num_samples)
                .map(SampleSet::Categorical),
        }
    }

    pub fn sample_regression(
        &self,
        ensemble: &PredictionEnsemble,
        input: &DVector<f64>,
        num_samples: usize,
    ) -> InferenceResult<Vec<RegressionSample>> {
        let base_seed = self.prepare(ClinicalModel::Fibrosis(ensemble), input, num_samples)?;
        draw(num_samples, base_seed, |rng| {
            let summary = ensemble.predict(input, Some(rng))?;
            Ok(RegressionSample {
                mean: summary.mean,
                noise_variance: summary.noise_variance,
            })
        })
    }

    pub fn sample_categorical(
        &self,
        classifier: &LesionClassifier,
        input: &DVector<f64>,
        num_samples: usize,
    ) -> InferenceResult<Vec<Vec<f64>>> {
        let base_seed = self.prepare(ClinicalModel::Lesion(classifier), input, num_samples)?;
        draw(num_samples, base_seed, |rng| classifier.probabilities(input, Some(rng)))
    }

    /// Validate a run and pick its base seed.
    fn prepare(&self, model: ClinicalModel<'_>, input: &DVector<f64>, num_samples: usize) -> InferenceResult<u64> {
        if num_samples < 2 {
            return Err(InferenceError::InvalidInput(format!(
                "Monte Carlo sampling needs at least 2 samples, got {num_samples}"
            )));
        }
        if input.len() != model.input_dim() {
            return Err(InferenceError::InvalidInput(format!(
                "{} expects {} inputs, got {}",
                model.name(),
                model.input_dim(),
                input.len()
            )));
        }

        let base_seed = self.seed.unwrap_or_else(rand::random::<u64>);
        tracing::debug!(
            model = model.name(),
            num_samples,
            base_seed,
            "Starting Monte Carlo dropout run"
        );
        Ok(base_seed)
    }
}

fn draw<T, F>(num_samples: usize, base_seed: u64, evaluate: F) -> InferenceResult<Vec<T>>
where
    T: Send,
    F: Fn(&mut StdRng) -> InferenceResult<T> + Sync,
{
    (0..num_samples)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(i as u64));
            evaluate(&mut rng).map_err(|e| {
                tracing::warn!(sample = i, error = %e, "Monte Carlo draw failed, aborting run");
                InferenceError::SamplingAborted {
                    sample: i,
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}
