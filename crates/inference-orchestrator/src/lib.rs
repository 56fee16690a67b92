//! Inference Orchestrator
//!
//! Wires the model registry, Monte Carlo sampler, uncertainty decomposer,
//! stage calibrator and risk rules into the two clinical call paths:
//! fibrosis stiffness regression and focal lesion classification.

pub mod config;
pub mod engine;
pub mod provider;
#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use engine::{FibrosisReport, FibrosisRequest, InferenceEngine, LesionReport, LesionRequest};
pub use provider::ClinicalInference;
