use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{InferenceError, InferenceResult};

/// Fixed-length embedding produced by the external feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f64>);

impl EmbeddingVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn ensure_dim(&self, expected: usize) -> InferenceResult<()> {
        if self.dim() != expected {
            return Err(InferenceError::InvalidInput(format!(
                "embedding has {} dimensions, expected {}",
                self.dim(),
                expected
            )));
        }
        Ok(())
    }

    pub fn ensure_finite(&self) -> InferenceResult<()> {
        match self.0.iter().position(|v| !v.is_finite()) {
            Some(idx) => Err(InferenceError::InvalidInput(format!(
                "embedding component {idx} is not finite"
            ))),
            None => Ok(()),
        }
    }
}

impl From<Vec<f64>> for EmbeddingVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Ultrasound acquisition view, fed to the fibrosis heads as a one-hot vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewType {
    /// View A
    Intercostal,
    /// View B
    SubcostalHepaticVein,
    /// View C
    LiverRightKidney,
}

impl ViewType {
    pub const ALL: [ViewType; 3] = [
        ViewType::Intercostal,
        ViewType::SubcostalHepaticVein,
        ViewType::LiverRightKidney,
    ];

    pub fn index(&self) -> usize {
        match self {
            ViewType::Intercostal => 0,
            ViewType::SubcostalHepaticVein => 1,
            ViewType::LiverRightKidney => 2,
        }
    }

    pub fn one_hot(&self) -> [f64; 3] {
        let mut encoded = [0.0; 3];
        encoded[self.index()] = 1.0;
        encoded
    }

    /// Decode a one-hot vector. Exactly three entries, each 0 or 1, with a single 1.
    pub fn from_one_hot(encoded: &[f64]) -> InferenceResult<Self> {
        if encoded.len() != 3 {
            return Err(InferenceError::InvalidInput(format!(
                "view metadata must have 3 entries, got {}",
                encoded.len()
            )));
        }
        if encoded.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(InferenceError::InvalidInput(
                "view metadata must contain only 0 and 1".to_string(),
            ));
        }
        let hot: Vec<usize> = encoded
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == 1.0)
            .map(|(i, _)| i)
            .collect();
        match hot.as_slice() {
            [idx] => Ok(ViewType::ALL[*idx]),
            _ => Err(InferenceError::InvalidInput(format!(
                "view metadata must have exactly one active category, got {}",
                hot.len()
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Intercostal => "Intercostal",
            ViewType::SubcostalHepaticVein => "Subcostal hepatic vein",
            ViewType::LiverRightKidney => "Liver/right kidney",
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// View metadata as it arrives from a caller: either named or raw one-hot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewMetadata {
    Named(ViewType),
    OneHot(Vec<f64>),
}

impl ViewMetadata {
    pub fn resolve(&self) -> InferenceResult<ViewType> {
        match self {
            ViewMetadata::Named(view) => Ok(*view),
            ViewMetadata::OneHot(encoded) => ViewType::from_one_hot(encoded),
        }
    }
}

impl From<ViewType> for ViewMetadata {
    fn from(view: ViewType) -> Self {
        ViewMetadata::Named(view)
    }
}

/// Image usability scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub overall: f64,
    pub blur: f64,
    pub noise: f64,
    pub artifact: f64,
}

/// Epistemic/aleatoric split of predictive uncertainty.
///
/// Regression: variances in kPa². Classification: epistemic is mutual
/// information and aleatoric the entropy of the mean distribution (nats).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyEstimate {
    pub epistemic: f64,
    pub aleatoric: f64,
    pub total: f64,
}

impl UncertaintyEstimate {
    pub fn new(epistemic: f64, aleatoric: f64) -> Self {
        Self {
            epistemic,
            aleatoric,
            total: epistemic + aleatoric,
        }
    }
}

/// Supported two-sided interval levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    P95,
    P99,
}

impl ConfidenceLevel {
    pub fn from_probability(level: f64) -> InferenceResult<Self> {
        if level == 0.95 {
            Ok(ConfidenceLevel::P95)
        } else if level == 0.99 {
            Ok(ConfidenceLevel::P99)
        } else {
            Err(InferenceError::UnsupportedConfidence(level))
        }
    }

    pub fn z_score(&self) -> f64 {
        match self {
            ConfidenceLevel::P95 => 1.96,
            ConfidenceLevel::P99 => 2.58,
        }
    }

    pub fn probability(&self) -> f64 {
        match self {
            ConfidenceLevel::P95 => 0.95,
            ConfidenceLevel::P99 => 0.99,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInterval {
    pub lower: f64,
    pub upper: f64,
    pub confidence: f64,
}

/// `Fast` is a single deterministic pass; `Uncertainty` runs Monte Carlo sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    Fast,
    #[default]
    Uncertainty,
}
