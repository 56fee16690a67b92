use hepatic_core::{InferenceError, InferenceResult};
use nalgebra::DVector;
use rand::rngs::StdRng;

use crate::layer::{
    constant_stack, dropout_in_place, relu_in_place, validate_dropout, validate_stack,
    xavier_stack, DenseLayer,
};

/// Raw output of one head: point estimate and log data-noise variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadOutput {
    pub mean: f64,
    pub log_variance: f64,
}

impl HeadOutput {
    pub fn noise_variance(&self) -> f64 {
        self.log_variance.exp()
    }
}

/// One ensemble member mapping `embedding ++ view one-hot` to
/// `(mean, log_variance)`.
#[derive(Debug, Clone)]
pub struct PredictionHead {
    hidden: Vec<DenseLayer>,
    output: DenseLayer,
    dropout_rate: f64,
}

impl PredictionHead {
    pub fn new(hidden: Vec<DenseLayer>, output: DenseLayer, dropout_rate: f64) -> InferenceResult<Self> {
        validate_dropout(dropout_rate)?;
        validate_stack(&hidden, &output)?;
        if output.outputs() != 2 {
            return Err(InferenceError::InvalidInput(format!(
                "prediction head must emit (mean, log_variance), got {} outputs",
                output.outputs()
            )));
        }
        Ok(Self {
            hidden,
            output,
            dropout_rate,
        })
    }

    pub fn initialize(
        input_dim: usize,
        hidden_sizes: &[usize],
        dropout_rate: f64,
        rng: &mut StdRng,
    ) -> InferenceResult<Self> {
        let (hidden, output) = xavier_stack(input_dim, hidden_sizes, 2, rng);
        Self::new(hidden, output, dropout_rate)
    }

    /// Head that ignores its input and always reports `(mean, log_variance)`.
    pub fn constant(
        input_dim: usize,
        hidden_sizes: &[usize],
        mean: f64,
        log_variance: f64,
        dropout_rate: f64,
    ) -> InferenceResult<Self> {
        let (hidden, output) = constant_stack(input_dim, hidden_sizes, &[mean, log_variance]);
        Self::new(hidden, output, dropout_rate)
    }

    pub fn input_dim(&self) -> usize {
        self.hidden.first().unwrap_or(&self.output).inputs()
    }

    /// Evaluate the head. Hidden units are randomly suppressed iff `rng` is
    /// supplied; without it the output is a pure function of the input.
    pub fn forward(&self, input: &DVector<f64>, mut rng: Option<&mut StdRng>) -> InferenceResult<HeadOutput> {
        let mut x = input.clone();
        for layer in &self.hidden {
            x = layer.forward(&x)?;
            relu_in_place(&mut x);
            if let Some(rng) = rng.as_deref_mut() {
                dropout_in_place(&mut x, self.dropout_rate, rng);
            }
        }
        let out = self.output.forward(&x)?;
        let output = HeadOutput {
            mean: out[0],
            log_variance: out[1],
        };
        if !output.mean.is_finite() || !output.log_variance.is_finite() {
            return Err(InferenceError::NumericInstability(format!(
                "head produced non-finite output (mean={}, log_variance={})",
                output.mean, output.log_variance
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn input(dim: usize) -> DVector<f64> {
        DVector::from_fn(dim, |i, _| ((i as f64) * 0.37).sin())
    }

    #[test]
    fn test_deterministic_without_rng() {
        let mut rng = StdRng::seed_from_u64(3);
        let head = PredictionHead::initialize(11, &[16, 8], 0.15, &mut rng).unwrap();
        let x = input(11);
        let a = head.forward(&x, None).unwrap();
        let b = head.forward(&x, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stochastic_with_rng_varies() {
        let mut init = StdRng::seed_from_u64(3);
        let head = PredictionHead::initialize(11, &[32, 16], 0.2, &mut init).unwrap();
        let x = input(11);
        let mut rng = StdRng::seed_from_u64(99);
        let outputs: Vec<f64> = (0..10)
            .map(|_| head.forward(&x, Some(&mut rng)).unwrap().mean)
            .collect();
        assert!(outputs.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_constant_head_ignores_input_and_dropout() {
        let head = PredictionHead::constant(5, &[4], 6.5, -2.0, 0.15).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let out = head.forward(&input(5), Some(&mut rng)).unwrap();
        assert_eq!(out.mean, 6.5);
        assert_eq!(out.log_variance, -2.0);
        assert!((out.noise_variance() - (-2.0f64).exp()).abs() < 1e-15);
        assert_eq!(head.input_dim(), 5);
    }

    #[test]
    fn test_wrong_input_dimension() {
        let head = PredictionHead::constant(5, &[4], 6.5, -2.0, 0.15).unwrap();
        let err = head.forward(&input(6), None).unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_output_width_enforced() {
        let result = PredictionHead::new(vec![DenseLayer::zeros(4, 3)], DenseLayer::zeros(3, 1), 0.1);
        assert!(result.is_err());
    }
}
