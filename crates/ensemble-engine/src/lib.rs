//! Ensemble Engine
//!
//! Parameterised networks that turn an embedding into a predictive
//! distribution, plus the Monte Carlo dropout sampler that re-evaluates them
//! with random unit suppression to expose model uncertainty.
//!
//! All parameters are read-only after construction. Stochastic behaviour is
//! requested per call by passing an RNG; no network carries a train/eval mode.

pub mod classifier;
pub mod ensemble;
pub mod head;
pub mod layer;
pub mod quality;
pub mod registry;
pub mod sampler;

pub use classifier::{softmax, LesionClassifier};
pub use ensemble::{EnsembleSummary, PredictionEnsemble};
pub use head::{HeadOutput, PredictionHead};
pub use layer::DenseLayer;
pub use quality::QualityAssessor;
pub use registry::{ModelArchitecture, ModelRegistry};
pub use sampler::{
    ClinicalModel, McDropoutSampler, PredictiveDistribution, RegressionSample, SampleSet,
};

pub use nalgebra::{DMatrix, DVector};
pub use rand::rngs::StdRng;
