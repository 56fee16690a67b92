use hepatic_core::{ensure_finite, InferenceError, InferenceResult};
use nalgebra::DVector;
use rand::rngs::StdRng;
use statrs::statistics::Statistics;

use crate::head::{HeadOutput, PredictionHead};

/// Ensemble-level view of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleSummary {
    /// Average of head means.
    pub mean: f64,
    /// Sample variance of head means (disagreement between heads).
    pub head_variance: f64,
    /// Average of the heads' exponentiated log-variances.
    pub noise_variance: f64,
}

/// Fixed-size ordered collection of independently parameterised heads.
/// No head is privileged.
#[derive(Debug, Clone)]
pub struct PredictionEnsemble {
    heads: Vec<PredictionHead>,
}

impl PredictionEnsemble {
    pub const DEFAULT_SIZE: usize = 5;

    pub fn new(heads: Vec<PredictionHead>) -> InferenceResult<Self> {
        if heads.len() < 2 {
            return Err(InferenceError::InvalidInput(format!(
                "ensemble needs at least 2 heads, got {}",
                heads.len()
            )));
        }
        let input_dim = heads[0].input_dim();
        if let Some(pos) = heads.iter().position(|h| h.input_dim() != input_dim) {
            return Err(InferenceError::InvalidInput(format!(
                "head {pos} expects {} inputs, head 0 expects {input_dim}",
                heads[pos].input_dim()
            )));
        }
        Ok(Self { heads })
    }

    pub fn initialize(
        size: usize,
        input_dim: usize,
        hidden_sizes: &[usize],
        dropout_rate: f64,
        rng: &mut StdRng,
    ) -> InferenceResult<Self> {
        let heads = (0..size)
            .map(|_| PredictionHead::initialize(input_dim, hidden_sizes, dropout_rate, rng))
            .collect::<InferenceResult<Vec<_>>>()?;
        Self::new(heads)
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    pub fn input_dim(&self) -> usize {
        self.heads[0].input_dim()
    }

    /// Per-head outputs in ensemble order. Suppression is active iff `rng`
    /// is supplied.
    pub fn evaluate(&self, input: &DVector<f64>, mut rng: Option<&mut StdRng>) -> InferenceResult<Vec<HeadOutput>> {
        self.heads
            .iter()
            .map(|head| head.forward(input, rng.as_deref_mut()))
            .collect()
    }

    pub fn predict(&self, input: &DVector<f64>, rng: Option<&mut StdRng>) -> InferenceResult<EnsembleSummary> {
        Self::summarize(&self.evaluate(input, rng)?)
    }

    pub fn summarize(outputs: &[HeadOutput]) -> InferenceResult<EnsembleSummary> {
        if outputs.len() < 2 {
            return Err(InferenceError::InvalidInput(
                "at least 2 head outputs are needed to summarise an ensemble".to_string(),
            ));
        }
        let means: Vec<f64> = outputs.iter().map(|o| o.mean).collect();
        let mean = ensure_finite("ensemble mean", means.iter().mean())?;
        let head_variance = ensure_finite("head variance", means.iter().variance())?;
        let noise_variance = ensure_finite(
            "ensemble noise variance",
            outputs.iter().map(HeadOutput::noise_variance).mean(),
        )?;
        Ok(EnsembleSummary {
            mean,
            head_variance,
            noise_variance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn constant_ensemble(means: &[f64], log_variance: f64) -> PredictionEnsemble {
        let heads = means
            .iter()
            .map(|&m| PredictionHead::constant(4, &[3], m, log_variance, 0.15).unwrap())
            .collect();
        PredictionEnsemble::new(heads).unwrap()
    }

    #[test]
    fn test_summary_statistics() {
        let ensemble = constant_ensemble(&[6.0, 7.0, 8.0], 0.0);
        let summary = ensemble.predict(&DVector::zeros(4), None).unwrap();
        assert!((summary.mean - 7.0).abs() < 1e-12);
        // sample variance of {6, 7, 8}
        assert!((summary.head_variance - 1.0).abs() < 1e-12);
        assert!((summary.noise_variance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_agreeing_heads_have_zero_spread() {
        let ensemble = constant_ensemble(&[6.5; 5], -1.0);
        let summary = ensemble.predict(&DVector::zeros(4), None).unwrap();
        assert_eq!(summary.head_variance, 0.0);
        assert!((summary.noise_variance - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_overflowing_noise_is_unstable() {
        let ensemble = constant_ensemble(&[6.5, 6.6], 900.0);
        let err = ensemble.predict(&DVector::zeros(4), None).unwrap_err();
        assert!(matches!(err, InferenceError::NumericInstability(_)));
    }

    #[test]
    fn test_requires_two_heads_of_equal_width() {
        let single = vec![PredictionHead::constant(4, &[3], 1.0, 0.0, 0.1).unwrap()];
        assert!(PredictionEnsemble::new(single).is_err());

        let mixed = vec![
            PredictionHead::constant(4, &[3], 1.0, 0.0, 0.1).unwrap(),
            PredictionHead::constant(5, &[3], 1.0, 0.0, 0.1).unwrap(),
        ];
        assert!(PredictionEnsemble::new(mixed).is_err());
    }

    #[test]
    fn test_initialized_heads_do_not_share_weights() {
        let mut rng = StdRng::seed_from_u64(11);
        let ensemble = PredictionEnsemble::initialize(5, 6, &[8, 4], 0.15, &mut rng).unwrap();
        let x = DVector::from_fn(6, |i, _| 0.2 * i as f64 + 0.1);
        let outputs = ensemble.evaluate(&x, None).unwrap();
        assert_eq!(outputs.len(), 5);
        assert!(outputs.windows(2).any(|w| w[0].mean != w[1].mean));
    }
}
