use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use clinical_risk::{interpret_fibrosis, interpret_lesion, ClinicalInterpretation, RiskRuleEngine};
use ensemble_engine::{McDropoutSampler, ModelRegistry};
use hepatic_core::{
    ClinicalSignificance, ConfidenceLevel, EmbeddingVector, FibrosisStage, InferenceError,
    InferenceMode, InferenceResult, LesionClass, PredictionInterval, QualityScores,
    RiskAssessment, Urgency, ViewMetadata, ViewType,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uncertainty_calibrator::{
    calibrate, confidence_score, decompose_categorical, decompose_ensemble, decompose_regression,
    prediction_interval, single_pass_categorical, CategoricalDecomposition,
    RegressionDecomposition,
};

use crate::config::EngineConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibrosisRequest {
    pub embedding: EmbeddingVector,
    #[serde(alias = "metadata")]
    pub view: ViewMetadata,
    #[serde(default)]
    pub mode: InferenceMode,
    #[serde(default)]
    pub num_samples: Option<usize>,
    /// Independently measured stage label such as `"F2"`. Unrecognised
    /// labels are ignored.
    #[serde(default)]
    pub reference_stage: Option<String>,
    /// Interval level; defaults to the engine's configured level.
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibrosisReport {
    /// Unclamped ensemble estimate.
    pub mean_kpa: f64,
    pub clamped_kpa: f64,
    pub stage: FibrosisStage,
    pub stage_description: String,
    pub reference_stage: Option<FibrosisStage>,
    pub view: ViewType,
    pub epistemic: f64,
    pub aleatoric: f64,
    pub total_uncertainty: f64,
    pub confidence_score: f64,
    pub prediction_interval: PredictionInterval,
    pub quality: QualityScores,
    pub risk: RiskAssessment,
    pub interpretation: ClinicalInterpretation,
    pub mode: InferenceMode,
    pub num_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LesionRequest {
    pub embedding: EmbeddingVector,
    #[serde(default)]
    pub mode: InferenceMode,
    #[serde(default)]
    pub num_samples: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LesionReport {
    /// Keyed in classifier output order.
    pub class_probabilities: BTreeMap<LesionClass, f64>,
    pub predicted_class: LesionClass,
    pub confidence_score: f64,
    pub clinical_significance: ClinicalSignificance,
    pub recommended_urgency: Urgency,
    /// Mutual information between prediction and model draw.
    pub epistemic: f64,
    /// Entropy of the mean distribution.
    pub aleatoric: f64,
    pub total_uncertainty: f64,
    pub prediction_variance: BTreeMap<LesionClass, f64>,
    pub risk: RiskAssessment,
    pub interpretation: ClinicalInterpretation,
    pub mode: InferenceMode,
    pub num_samples: usize,
}

/// Stateless per call; clones share the same read-only registry.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    registry: Arc<ModelRegistry>,
    config: Arc<EngineConfig>,
    rules: RiskRuleEngine,
    sampler: McDropoutSampler,
}

impl InferenceEngine {
    pub fn new(registry: Arc<ModelRegistry>, config: EngineConfig) -> InferenceResult<Self> {
        config.validate()?;
        let rules = RiskRuleEngine::new(config.risk.clone());
        let sampler = McDropoutSampler::new(config.mc_seed);

        tracing::info!(
            "Inference engine ready: embedding_dim={}, ensemble_heads={}, mc_samples={}, classifier_mc_samples={}, seeded={}",
            registry.embedding_dim(),
            registry.fibrosis().len(),
            config.mc_samples,
            config.classifier_mc_samples,
            config.mc_seed.is_some()
        );

        Ok(Self {
            registry,
            config: Arc::new(config),
            rules,
            sampler,
        })
    }

    /// Build a registry from the configured architecture and model seed.
    pub fn from_config(config: EngineConfig) -> InferenceResult<Self> {
        let registry = ModelRegistry::initialize(&config.architecture, config.model_seed)?;
        Self::new(Arc::new(registry), config)
    }

    pub fn infer_fibrosis(&self, request: &FibrosisRequest) -> InferenceResult<FibrosisReport> {
        let started = Instant::now();

        let view = request.view.resolve()?;
        let level = match request.confidence {
            Some(level) => ConfidenceLevel::from_probability(level)?,
            None => self.config.default_confidence()?,
        };
        let input = self.registry.fibrosis_input(&request.embedding, view)?;
        let quality = self.registry.quality().assess(&request.embedding)?;

        let decomposition = self.fibrosis_decomposition(request, &input)?;
        let reference = request.reference_stage.as_deref().and_then(resolve_reference);

        // Uncertainty and interval describe the unclamped estimate; only the
        // point estimate is clipped into the reference range.
        let calibration = calibrate(decomposition.predictive_mean, reference)?;
        let uncertainty = decomposition.uncertainty;
        let interval = prediction_interval(decomposition.predictive_mean, uncertainty.total, level)?;
        let risk = self.rules.assess_fibrosis(&calibration, &uncertainty, &quality);
        let interpretation = interpret_fibrosis(calibration.stage, &uncertainty, &quality);

        if risk.requires_review {
            tracing::warn!(
                stage = %calibration.stage,
                risk_level = %risk.risk_level,
                factors = ?risk.risk_factors,
                "Fibrosis result flagged for review"
            );
        }
        tracing::debug!(
            mode = ?request.mode,
            view = %view,
            num_samples = decomposition.num_samples,
            mean_kpa = decomposition.predictive_mean,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Fibrosis inference complete"
        );

        Ok(FibrosisReport {
            mean_kpa: decomposition.predictive_mean,
            clamped_kpa: calibration.clamped_kpa,
            stage: calibration.stage,
            stage_description: calibration.stage.description().to_string(),
            reference_stage: calibration.reference,
            view,
            epistemic: uncertainty.epistemic,
            aleatoric: uncertainty.aleatoric,
            total_uncertainty: uncertainty.total,
            confidence_score: confidence_score(uncertainty.epistemic),
            prediction_interval: interval,
            quality,
            risk,
            interpretation,
            mode: request.mode,
            num_samples: decomposition.num_samples,
        })
    }

    pub fn classify_lesion(&self, request: &LesionRequest) -> InferenceResult<LesionReport> {
        let started = Instant::now();

        let input = self.registry.lesion_input(&request.embedding)?;
        let decomposition = self.lesion_decomposition(request, &input)?;

        let predicted_class = LesionClass::from_index(decomposition.predicted_index).ok_or_else(|| {
            InferenceError::NumericInstability(format!(
                "classifier produced no class for index {}",
                decomposition.predicted_index
            ))
        })?;
        let confidence = decomposition.mean_probabilities[decomposition.predicted_index];
        let uncertainty = decomposition.uncertainty;
        let risk = self.rules.assess_lesion(predicted_class, confidence, &uncertainty);
        let interpretation = interpret_lesion(predicted_class, confidence, &uncertainty);

        if risk.requires_review {
            tracing::warn!(
                class = %predicted_class,
                confidence,
                risk_level = %risk.risk_level,
                factors = ?risk.risk_factors,
                "Lesion result flagged for review"
            );
        }
        tracing::debug!(
            mode = ?request.mode,
            num_samples = decomposition.num_samples,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Lesion classification complete"
        );

        Ok(LesionReport {
            class_probabilities: by_class(&decomposition.mean_probabilities),
            predicted_class,
            confidence_score: confidence,
            clinical_significance: predicted_class.significance(),
            recommended_urgency: predicted_class.urgency(),
            epistemic: uncertainty.epistemic,
            aleatoric: uncertainty.aleatoric,
            total_uncertainty: uncertainty.total,
            prediction_variance: by_class(&decomposition.prediction_variance),
            risk,
            interpretation,
            mode: request.mode,
            num_samples: decomposition.num_samples,
        })
    }

    /// Independent requests evaluated in parallel; results keep request order.
    pub fn infer_fibrosis_batch(&self, requests: &[FibrosisRequest]) -> Vec<InferenceResult<FibrosisReport>> {
        requests
            .par_iter()
            .map(|request| self.infer_fibrosis(request))
            .collect()
    }

    pub fn classify_lesion_batch(&self, requests: &[LesionRequest]) -> Vec<InferenceResult<LesionReport>> {
        requests
            .par_iter()
            .map(|request| self.classify_lesion(request))
            .collect()
    }

    fn fibrosis_decomposition(
        &self,
        request: &FibrosisRequest,
        input: &ensemble_engine::DVector<f64>,
    ) -> InferenceResult<RegressionDecomposition> {
        let ensemble = self.registry.fibrosis();
        match request.mode {
            InferenceMode::Fast => decompose_ensemble(&ensemble.predict(input, None)?),
            InferenceMode::Uncertainty => {
                let num_samples = request.num_samples.unwrap_or(self.config.mc_samples);
                let samples = self.sampler.sample_regression(ensemble, input, num_samples)?;
                decompose_regression(&samples)
            }
        }
    }

    fn lesion_decomposition(
        &self,
        request: &LesionRequest,
        input: &ensemble_engine::DVector<f64>,
    ) -> InferenceResult<CategoricalDecomposition> {
        let classifier = self.registry.lesion();
        match request.mode {
            InferenceMode::Fast => single_pass_categorical(&classifier.probabilities(input, None)?),
            InferenceMode::Uncertainty => {
                let num_samples = request.num_samples.unwrap_or(self.config.classifier_mc_samples);
                let samples = self.sampler.sample_categorical(classifier, input, num_samples)?;
                decompose_categorical(&samples)
            }
        }
    }
}

fn resolve_reference(label: &str) -> Option<FibrosisStage> {
    let stage = FibrosisStage::parse(label);
    if stage.is_none() {
        tracing::warn!(reference_stage = label, "Unrecognised reference stage, leaving estimate unclamped");
    }
    stage
}

fn by_class(values: &[f64]) -> BTreeMap<LesionClass, f64> {
    LesionClass::ALL.iter().copied().zip(values.iter().copied()).collect()
}
