//! Uncertainty Decomposition
//!
//! Regression: epistemic is the spread of the point estimate across draws,
//! aleatoric the mean predicted data noise, and total their exact sum.
//! Classification: aleatoric is the entropy of the mean distribution and
//! epistemic the mutual information between prediction and model draw.

use ensemble_engine::{EnsembleSummary, RegressionSample, SampleSet};
use hepatic_core::{
    ensure_finite, ConfidenceLevel, InferenceError, InferenceResult, PredictionInterval,
    UncertaintyEstimate,
};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Added inside every logarithm so zero-probability classes stay finite.
pub const ENTROPY_EPSILON: f64 = 1e-8;

/// Mutual information this far below zero is rounding; further is a bug.
pub const MUTUAL_INFORMATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionDecomposition {
    pub predictive_mean: f64,
    pub uncertainty: UncertaintyEstimate,
    pub num_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalDecomposition {
    pub mean_probabilities: Vec<f64>,
    pub predicted_index: usize,
    pub uncertainty: UncertaintyEstimate,
    /// Entropy of the mean distribution.
    pub predictive_entropy: f64,
    /// Mean of the per-draw entropies.
    pub expected_sample_entropy: f64,
    /// Per-class sample variance across draws.
    pub prediction_variance: Vec<f64>,
    pub num_samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    Regression(RegressionDecomposition),
    Categorical(CategoricalDecomposition),
}

pub fn decompose(samples: &SampleSet) -> InferenceResult<Decomposition> {
    match samples {
        SampleSet::Regression(samples) => decompose_regression(samples).map(Decomposition::Regression),
        SampleSet::Categorical(samples) => {
            decompose_categorical(samples).map(Decomposition::Categorical)
        }
    }
}

pub fn decompose_regression(samples: &[RegressionSample]) -> InferenceResult<RegressionDecomposition> {
    if samples.len() < 2 {
        return Err(InferenceError::InvalidInput(format!(
            "regression decomposition needs at least 2 samples, got {}",
            samples.len()
        )));
    }
    let means: Vec<f64> = samples.iter().map(|s| s.mean).collect();
    let predictive_mean = ensure_finite("predictive mean", means.iter().mean())?;
    let epistemic = non_negative("epistemic variance", means.iter().variance())?;
    let aleatoric = non_negative(
        "aleatoric variance",
        samples.iter().map(|s| s.noise_variance).mean(),
    )?;
    let uncertainty = UncertaintyEstimate::new(epistemic, aleatoric);
    ensure_finite("total uncertainty", uncertainty.total)?;
    tracing::debug!(
        num_samples = samples.len(),
        predictive_mean,
        epistemic,
        aleatoric,
        "Regression uncertainty decomposed"
    );

    Ok(RegressionDecomposition {
        predictive_mean,
        uncertainty,
        num_samples: samples.len(),
    })
}

/// Deterministic single-pass variant: head disagreement stands in for the
/// epistemic term.
pub fn decompose_ensemble(summary: &EnsembleSummary) -> InferenceResult<RegressionDecomposition> {
    let predictive_mean = ensure_finite("ensemble mean", summary.mean)?;
    let epistemic = non_negative("head variance", summary.head_variance)?;
    let aleatoric = non_negative("ensemble noise variance", summary.noise_variance)?;
    let uncertainty = UncertaintyEstimate::new(epistemic, aleatoric);
    ensure_finite("total uncertainty", uncertainty.total)?;
    Ok(RegressionDecomposition {
        predictive_mean,
        uncertainty,
        num_samples: 1,
    })
}

pub fn decompose_categorical(samples: &[Vec<f64>]) -> InferenceResult<CategoricalDecomposition> {
    if samples.len() < 2 {
        return Err(InferenceError::InvalidInput(format!(
            "categorical decomposition needs at least 2 samples, got {}",
            samples.len()
        )));
    }
    let classes = samples[0].len();
    if classes == 0 || samples.iter().any(|p| p.len() != classes) {
        return Err(InferenceError::InvalidInput(
            "every sample must hold the same non-zero number of class probabilities".to_string(),
        ));
    }
    if samples.iter().flatten().any(|p| !p.is_finite()) {
        return Err(InferenceError::NumericInstability(
            "sampled class probabilities contain non-finite values".to_string(),
        ));
    }

    let n = samples.len() as f64;
    let mean_probabilities: Vec<f64> = (0..classes)
        .map(|c| samples.iter().map(|p| p[c]).sum::<f64>() / n)
        .collect();
    let prediction_variance: Vec<f64> = (0..classes)
        .map(|c| samples.iter().map(|p| p[c]).variance())
        .collect();

    let predictive_entropy = ensure_finite("predictive entropy", entropy(&mean_probabilities))?;
    let expected_sample_entropy = ensure_finite(
        "expected sample entropy",
        samples.iter().map(|p| entropy(p)).sum::<f64>() / n,
    )?;

    let mutual_information = predictive_entropy - expected_sample_entropy;
    if mutual_information < -MUTUAL_INFORMATION_TOLERANCE {
        return Err(InferenceError::NumericInstability(format!(
            "mutual information is negative ({mutual_information:e})"
        )));
    }
    tracing::debug!(
        num_samples = samples.len(),
        predictive_entropy,
        expected_sample_entropy,
        mutual_information,
        "Categorical uncertainty decomposed"
    );

    Ok(CategoricalDecomposition {
        predicted_index: argmax(&mean_probabilities),
        uncertainty: UncertaintyEstimate::new(mutual_information.max(0.0), predictive_entropy),
        mean_probabilities,
        predictive_entropy,
        expected_sample_entropy,
        prediction_variance,
        num_samples: samples.len(),
    })
}

/// Deterministic single-pass variant: no draws, so no model disagreement.
pub fn single_pass_categorical(probabilities: &[f64]) -> InferenceResult<CategoricalDecomposition> {
    if probabilities.is_empty() {
        return Err(InferenceError::InvalidInput(
            "probability vector is empty".to_string(),
        ));
    }
    let predictive_entropy = ensure_finite("predictive entropy", entropy(probabilities))?;
    Ok(CategoricalDecomposition {
        mean_probabilities: probabilities.to_vec(),
        predicted_index: argmax(probabilities),
        uncertainty: UncertaintyEstimate::new(0.0, predictive_entropy),
        predictive_entropy,
        expected_sample_entropy: predictive_entropy,
        prediction_variance: vec![0.0; probabilities.len()],
        num_samples: 1,
    })
}

/// Shannon entropy in nats with `ENTROPY_EPSILON` inside the log.
pub fn entropy(probabilities: &[f64]) -> f64 {
    -probabilities
        .iter()
        .map(|p| p * (p + ENTROPY_EPSILON).ln())
        .sum::<f64>()
}

/// `mean ± z * sqrt(total)`, with the lower bound clamped at zero since
/// stiffness cannot be negative.
pub fn prediction_interval(
    mean: f64,
    total_uncertainty: f64,
    level: ConfidenceLevel,
) -> InferenceResult<PredictionInterval> {
    ensure_finite("interval mean", mean)?;
    let total = non_negative("total uncertainty", total_uncertainty)?;
    let margin = level.z_score() * total.sqrt();
    let lower = (mean - margin).max(0.0);
    let upper = (mean + margin).max(lower);
    Ok(PredictionInterval {
        lower,
        upper,
        confidence: level.probability(),
    })
}

fn non_negative(name: &str, value: f64) -> InferenceResult<f64> {
    let value = ensure_finite(name, value)?;
    if value < 0.0 {
        return Err(InferenceError::NumericInstability(format!(
            "{name} is negative ({value})"
        )));
    }
    Ok(value)
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}
