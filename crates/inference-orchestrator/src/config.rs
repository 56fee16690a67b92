use anyhow::{Context, Result};
use clinical_risk::RiskRuleConfig;
use ensemble_engine::ModelArchitecture;
use hepatic_core::{ConfidenceLevel, InferenceError, InferenceResult};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // Model architecture
    pub architecture: ModelArchitecture,
    pub model_seed: u64,

    // Monte Carlo sampling
    pub mc_samples: usize,
    pub classifier_mc_samples: usize,
    /// Fixed base seed for reproducible runs; `None` reseeds every call.
    pub mc_seed: Option<u64>,

    /// Default prediction interval level (0.95 or 0.99).
    pub confidence_level: f64,

    // Review rules
    pub risk: RiskRuleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            architecture: ModelArchitecture::default(),
            model_seed: 42,
            mc_samples: 50,
            classifier_mc_samples: 30,
            mc_seed: None,
            confidence_level: 0.95,
            risk: RiskRuleConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let head_hidden = var("HEPA_HIDDEN_LAYERS", "512,256,128")
            .split(',')
            .map(|width| width.trim().parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("HEPA_HIDDEN_LAYERS must be a comma-separated list of widths")?;

        let defaults = ModelArchitecture::default();
        let architecture = ModelArchitecture {
            embedding_dim: var("HEPA_EMBEDDING_DIM", "512")
                .parse()
                .context("HEPA_EMBEDDING_DIM")?,
            ensemble_size: var("HEPA_ENSEMBLE_SIZE", "5")
                .parse()
                .context("HEPA_ENSEMBLE_SIZE")?,
            head_hidden,
            head_dropout: var("HEPA_DROPOUT_RATE", "0.15")
                .parse()
                .context("HEPA_DROPOUT_RATE")?,
            classifier_dropout: var("HEPA_CLASSIFIER_DROPOUT", "0.2")
                .parse()
                .context("HEPA_CLASSIFIER_DROPOUT")?,
            classifier_temperature: var("HEPA_CLASSIFIER_TEMPERATURE", "1.5")
                .parse()
                .context("HEPA_CLASSIFIER_TEMPERATURE")?,
            ..defaults
        };

        let risk = RiskRuleConfig {
            uncertainty_threshold: var("HEPA_UNCERTAINTY_THRESHOLD", "0.3")
                .parse()
                .context("HEPA_UNCERTAINTY_THRESHOLD")?,
            borderline_tolerance_kpa: var("HEPA_BORDERLINE_TOLERANCE_KPA", "0.3")
                .parse()
                .context("HEPA_BORDERLINE_TOLERANCE_KPA")?,
            ..RiskRuleConfig::default()
        };

        let config = Self {
            architecture,
            model_seed: var("HEPA_MODEL_SEED", "42")
                .parse()
                .context("HEPA_MODEL_SEED")?,
            mc_samples: var("HEPA_MC_SAMPLES", "50")
                .parse()
                .context("HEPA_MC_SAMPLES")?,
            classifier_mc_samples: var("HEPA_CLASSIFIER_MC_SAMPLES", "30")
                .parse()
                .context("HEPA_CLASSIFIER_MC_SAMPLES")?,
            mc_seed: lookup("HEPA_MC_SEED")
                .filter(|seed| !seed.trim().is_empty())
                .map(|seed| seed.trim().parse())
                .transpose()
                .context("HEPA_MC_SEED")?,
            confidence_level: var("HEPA_CONFIDENCE_LEVEL", "0.95")
                .parse()
                .context("HEPA_CONFIDENCE_LEVEL")?,
            risk,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> InferenceResult<()> {
        self.architecture.validate()?;
        self.risk.validate()?;
        if self.mc_samples < 2 || self.classifier_mc_samples < 2 {
            return Err(InferenceError::InvalidInput(format!(
                "Monte Carlo sample counts must be at least 2 (got {} and {})",
                self.mc_samples, self.classifier_mc_samples
            )));
        }
        if !(self.architecture.classifier_temperature.is_finite()
            && self.architecture.classifier_temperature > 0.0)
        {
            return Err(InferenceError::InvalidInput(format!(
                "classifier temperature must be positive, got {}",
                self.architecture.classifier_temperature
            )));
        }
        ConfidenceLevel::from_probability(self.confidence_level)?;
        Ok(())
    }

    pub fn default_confidence(&self) -> InferenceResult<ConfidenceLevel> {
        ConfidenceLevel::from_probability(self.confidence_level)
    }
}
