use hepatic_core::{InferenceError, InferenceResult};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::Rng;

/// Fully connected affine layer, `y = W x + b`.
///
/// Inference-time batch normalisation is an affine map as well and is
/// expected to be folded into `W` and `b`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl DenseLayer {
    pub fn new(weights: DMatrix<f64>, bias: DVector<f64>) -> InferenceResult<Self> {
        if weights.nrows() != bias.len() {
            return Err(InferenceError::InvalidInput(format!(
                "layer has {} output rows but {} bias terms",
                weights.nrows(),
                bias.len()
            )));
        }
        if weights.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(InferenceError::InvalidInput(
                "layer parameters must be finite".to_string(),
            ));
        }
        Ok(Self { weights, bias })
    }

    /// Xavier-uniform weights, zero bias.
    pub fn xavier(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = DMatrix::from_fn(outputs, inputs, |_, _| rng.gen_range(-limit..limit));
        Self {
            weights,
            bias: DVector::zeros(outputs),
        }
    }

    pub fn zeros(inputs: usize, outputs: usize) -> Self {
        Self {
            weights: DMatrix::zeros(outputs, inputs),
            bias: DVector::zeros(outputs),
        }
    }

    /// Zero weights with a fixed bias: the output ignores the input.
    pub fn constant(inputs: usize, bias: &[f64]) -> Self {
        Self {
            weights: DMatrix::zeros(bias.len(), inputs),
            bias: DVector::from_column_slice(bias),
        }
    }

    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn forward(&self, x: &DVector<f64>) -> InferenceResult<DVector<f64>> {
        if x.len() != self.inputs() {
            return Err(InferenceError::InvalidInput(format!(
                "layer expects {} inputs, got {}",
                self.inputs(),
                x.len()
            )));
        }
        Ok(&self.weights * x + &self.bias)
    }
}

pub fn relu_in_place(x: &mut DVector<f64>) {
    x.apply(|v| *v = v.max(0.0));
}

/// Inverted dropout: each unit is zeroed with probability `rate` and the
/// survivors are rescaled by `1 / (1 - rate)`.
pub fn dropout_in_place(x: &mut DVector<f64>, rate: f64, rng: &mut StdRng) {
    if rate <= 0.0 {
        return;
    }
    let scale = 1.0 / (1.0 - rate);
    for v in x.iter_mut() {
        if rng.gen::<f64>() < rate {
            *v = 0.0;
        } else {
            *v *= scale;
        }
    }
}

pub fn validate_dropout(rate: f64) -> InferenceResult<()> {
    if !(0.0..1.0).contains(&rate) {
        return Err(InferenceError::InvalidInput(format!(
            "dropout rate must be in [0, 1), got {rate}"
        )));
    }
    Ok(())
}

/// Check that consecutive layers agree on their widths.
pub(crate) fn validate_stack(hidden: &[DenseLayer], output: &DenseLayer) -> InferenceResult<()> {
    let mut width: Option<usize> = None;
    for layer in hidden.iter().chain(std::iter::once(output)) {
        if let Some(expected) = width {
            if layer.inputs() != expected {
                return Err(InferenceError::InvalidInput(format!(
                    "layer expects {} inputs but previous layer emits {}",
                    layer.inputs(),
                    expected
                )));
            }
        }
        width = Some(layer.outputs());
    }
    Ok(())
}

/// Build a randomly initialised stack `input -> hidden.. -> outputs`.
pub(crate) fn xavier_stack(
    input_dim: usize,
    hidden_sizes: &[usize],
    outputs: usize,
    rng: &mut StdRng,
) -> (Vec<DenseLayer>, DenseLayer) {
    let mut width = input_dim;
    let mut hidden = Vec::with_capacity(hidden_sizes.len());
    for &size in hidden_sizes {
        hidden.push(DenseLayer::xavier(width, size, rng));
        width = size;
    }
    (hidden, DenseLayer::xavier(width, outputs, rng))
}

/// Zero-weight hidden stack whose output is the given bias.
pub(crate) fn constant_stack(
    input_dim: usize,
    hidden_sizes: &[usize],
    output_bias: &[f64],
) -> (Vec<DenseLayer>, DenseLayer) {
    let mut width = input_dim;
    let mut hidden = Vec::with_capacity(hidden_sizes.len());
    for &size in hidden_sizes {
        hidden.push(DenseLayer::zeros(width, size));
        width = size;
    }
    (hidden, DenseLayer::constant(width, output_bias))
}
