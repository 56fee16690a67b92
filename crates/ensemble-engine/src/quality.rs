use hepatic_core::{EmbeddingVector, InferenceError, InferenceResult, QualityScores};
use nalgebra::DVector;
use rand::rngs::StdRng;

use crate::layer::{relu_in_place, validate_stack, xavier_stack, DenseLayer};

/// Scores an embedding for usability: overall quality, blur, noise and
/// artifact indicators. Always deterministic.
#[derive(Debug, Clone)]
pub struct QualityAssessor {
    hidden: Vec<DenseLayer>,
    output: DenseLayer,
}

impl QualityAssessor {
    pub const DEFAULT_HIDDEN: [usize; 2] = [256, 128];

    pub fn new(hidden: Vec<DenseLayer>, output: DenseLayer) -> InferenceResult<Self> {
        validate_stack(&hidden, &output)?;
        if output.outputs() != 4 {
            return Err(InferenceError::InvalidInput(format!(
                "quality network must emit 4 scores, got {}",
                output.outputs()
            )));
        }
        Ok(Self { hidden, output })
    }

    pub fn initialize(input_dim: usize, hidden_sizes: &[usize], rng: &mut StdRng) -> InferenceResult<Self> {
        let (hidden, output) = xavier_stack(input_dim, hidden_sizes, 4, rng);
        Self::new(hidden, output)
    }

    /// Assessor that reports fixed scores; each must lie strictly inside (0, 1).
    pub fn constant(input_dim: usize, scores: QualityScores) -> InferenceResult<Self> {
        let values = [scores.overall, scores.blur, scores.noise, scores.artifact];
        if values.iter().any(|v| !(*v > 0.0 && *v < 1.0)) {
            return Err(InferenceError::InvalidInput(
                "constant quality scores must lie strictly between 0 and 1".to_string(),
            ));
        }
        let logits: Vec<f64> = values.iter().map(|p| (p / (1.0 - p)).ln()).collect();
        Self::new(Vec::new(), DenseLayer::constant(input_dim, &logits))
    }

    pub fn input_dim(&self) -> usize {
        self.hidden.first().unwrap_or(&self.output).inputs()
    }

    pub fn assess(&self, embedding: &EmbeddingVector) -> InferenceResult<QualityScores> {
        embedding.ensure_dim(self.input_dim())?;
        embedding.ensure_finite()?;
        let mut x = DVector::from_column_slice(embedding.as_slice());
        for layer in &self.hidden {
            x = layer.forward(&x)?;
            relu_in_place(&mut x);
        }
        let logits = self.output.forward(&x)?;
        let scores: Vec<f64> = logits.iter().map(|l| sigmoid(*l)).collect();
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(InferenceError::NumericInstability(
                "quality network produced non-finite scores".to_string(),
            ));
        }
        Ok(QualityScores {
            overall: scores[0],
            blur: scores[1],
            noise: scores[2],
            artifact: scores[3],
        })
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
