use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported confidence level: {0}")]
    UnsupportedConfidence(f64),

    #[error("Numeric instability: {0}")]
    NumericInstability(String),

    #[error("Sampling aborted at draw {sample}: {reason}")]
    SamplingAborted { sample: usize, reason: String },

    #[error("Deadline exceeded before inference started")]
    DeadlineExceeded,

    #[error("Worker error: {0}")]
    Worker(String),
}

impl InferenceError {
    /// Caller-side contract violations; never worth repeating unchanged.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            InferenceError::InvalidInput(_) | InferenceError::UnsupportedConfidence(_)
        )
    }
}

pub type InferenceResult<T> = Result<T, InferenceError>;

/// Fail with `NumericInstability` when a statistic is NaN or infinite.
pub fn ensure_finite(name: &str, value: f64) -> InferenceResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InferenceError::NumericInstability(format!(
            "{name} is not finite ({value})"
        )))
    }
}
