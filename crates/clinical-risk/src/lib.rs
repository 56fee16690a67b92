//! Clinical Risk
//!
//! Deterministic review rules and plain-language interpretation for fibrosis
//! staging and lesion classification results.

pub mod interpretation;
pub mod rules;

pub use interpretation::{
    interpret_fibrosis, interpret_lesion, Band, ClinicalInterpretation,
};
pub use rules::{RiskRuleConfig, RiskRuleEngine};
