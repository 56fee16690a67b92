//! Uncertainty Calibrator
//!
//! Splits Monte Carlo sample sets into epistemic (model) and aleatoric (data)
//! uncertainty, builds prediction intervals, and maps continuous stiffness
//! estimates onto clinical fibrosis stages.

pub mod decomposer;
pub mod staging;

pub use decomposer::{
    decompose, decompose_categorical, decompose_ensemble, decompose_regression, entropy,
    prediction_interval, single_pass_categorical, CategoricalDecomposition, Decomposition,
    RegressionDecomposition, ENTROPY_EPSILON, MUTUAL_INFORMATION_TOLERANCE,
};
pub use staging::{calibrate, confidence_score, Calibration};
