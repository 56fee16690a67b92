use hepatic_core::{InferenceError, InferenceResult, LesionClass};
use nalgebra::DVector;
use rand::rngs::StdRng;

use crate::layer::{
    constant_stack, dropout_in_place, relu_in_place, validate_dropout, validate_stack,
    xavier_stack, DenseLayer,
};

/// Temperature-scaled lesion classifier over the embedding.
#[derive(Debug, Clone)]
pub struct LesionClassifier {
    hidden: Vec<DenseLayer>,
    output: DenseLayer,
    dropout_rate: f64,
    temperature: f64,
}

impl LesionClassifier {
    pub const DEFAULT_TEMPERATURE: f64 = 1.5;
    pub const DEFAULT_DROPOUT: f64 = 0.2;

    pub fn new(
        hidden: Vec<DenseLayer>,
        output: DenseLayer,
        dropout_rate: f64,
        temperature: f64,
    ) -> InferenceResult<Self> {
        validate_dropout(dropout_rate)?;
        validate_stack(&hidden, &output)?;
        if output.outputs() != LesionClass::COUNT {
            return Err(InferenceError::InvalidInput(format!(
                "classifier must emit {} logits, got {}",
                LesionClass::COUNT,
                output.outputs()
            )));
        }
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(InferenceError::InvalidInput(format!(
                "temperature must be positive, got {temperature}"
            )));
        }
        Ok(Self {
            hidden,
            output,
            dropout_rate,
            temperature,
        })
    }

    pub fn initialize(
        input_dim: usize,
        hidden_sizes: &[usize],
        dropout_rate: f64,
        temperature: f64,
        rng: &mut StdRng,
    ) -> InferenceResult<Self> {
        let (hidden, output) = xavier_stack(input_dim, hidden_sizes, LesionClass::COUNT, rng);
        Self::new(hidden, output, dropout_rate, temperature)
    }

    /// Classifier whose logits are fixed regardless of input.
    pub fn constant(
        input_dim: usize,
        hidden_sizes: &[usize],
        logits: [f64; LesionClass::COUNT],
        dropout_rate: f64,
        temperature: f64,
    ) -> InferenceResult<Self> {
        let (hidden, output) = constant_stack(input_dim, hidden_sizes, &logits);
        Self::new(hidden, output, dropout_rate, temperature)
    }

    pub fn input_dim(&self) -> usize {
        self.hidden.first().unwrap_or(&self.output).inputs()
    }

    /// Class probabilities in `LesionClass::ALL` order. With an RNG, dropout
    /// is applied to the input and after every hidden layer.
    pub fn probabilities(&self, input: &DVector<f64>, mut rng: Option<&mut StdRng>) -> InferenceResult<Vec<f64>> {
        let mut x = input.clone();
        if let Some(rng) = rng.as_deref_mut() {
            dropout_in_place(&mut x, self.dropout_rate, rng);
        }
        for layer in &self.hidden {
            x = layer.forward(&x)?;
            relu_in_place(&mut x);
            if let Some(rng) = rng.as_deref_mut() {
                dropout_in_place(&mut x, self.dropout_rate, rng);
            }
        }
        let logits = self.output.forward(&x)?;
        let scaled: Vec<f64> = logits.iter().map(|l| l / self.temperature).collect();
        let probabilities = softmax(&scaled);
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::NumericInstability(
                "classifier produced non-finite probabilities".to_string(),
            ));
        }
        Ok(probabilities)
    }
}

/// Max-shifted softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
