//! Risk Rule Engine
//!
//! Fixed, ordered rules over a staged result. Every triggered rule adds a
//! risk factor and forces human review. The final level is decided top-down
//! so stage always dominates factor count.

use hepatic_core::{
    interior_boundaries, ClinicalSignificance, FibrosisStage, InferenceError, InferenceResult,
    LesionClass, QualityScores, RiskAssessment, RiskLevel, UncertaintyEstimate, Urgency,
};
use serde::{Deserialize, Serialize};
use uncertainty_calibrator::Calibration;

pub const ADVANCED_FIBROSIS: &str = "Advanced fibrosis/cirrhosis";
pub const HIGH_UNCERTAINTY: &str = "High prediction uncertainty";
pub const POOR_QUALITY: &str = "Poor image quality";
pub const SIGNIFICANT_ARTIFACTS: &str = "Significant imaging artifacts";
pub const BORDERLINE_STAGE: &str = "Borderline fibrosis stage";
pub const CRITICAL_PATHOLOGY: &str = "Critical pathology detected";
pub const LOW_CONFIDENCE: &str = "Low prediction confidence";
pub const HIGH_SIGNIFICANCE_MODERATE_CONFIDENCE: &str =
    "High-significance condition with moderate confidence";

/// Thresholds for the review rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskRuleConfig {
    /// Fibrosis epistemic variance above which review is forced (kPa²).
    pub uncertainty_threshold: f64,
    /// Overall quality below this is "poor".
    pub poor_quality_threshold: f64,
    pub artifact_threshold: f64,
    /// Distance to an interior stage boundary that counts as borderline.
    pub borderline_tolerance_kpa: f64,
    /// Lesion mutual information above which review is forced (nats).
    pub lesion_uncertainty_threshold: f64,
    pub low_confidence_threshold: f64,
    /// High-significance classes need at least this confidence.
    pub high_significance_confidence: f64,
}

impl Default for RiskRuleConfig {
    fn default() -> Self {
        Self {
            uncertainty_threshold: 0.3,
            poor_quality_threshold: 0.5,
            artifact_threshold: 0.7,
            borderline_tolerance_kpa: 0.3,
            lesion_uncertainty_threshold: 0.5,
            low_confidence_threshold: 0.7,
            high_significance_confidence: 0.8,
        }
    }
}

impl RiskRuleConfig {
    pub fn validate(&self) -> InferenceResult<()> {
        let values = [
            ("uncertainty_threshold", self.uncertainty_threshold),
            ("poor_quality_threshold", self.poor_quality_threshold),
            ("artifact_threshold", self.artifact_threshold),
            ("borderline_tolerance_kpa", self.borderline_tolerance_kpa),
            ("lesion_uncertainty_threshold", self.lesion_uncertainty_threshold),
            ("low_confidence_threshold", self.low_confidence_threshold),
            ("high_significance_confidence", self.high_significance_confidence),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(InferenceError::InvalidInput(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskRuleEngine {
    config: RiskRuleConfig,
}

impl RiskRuleEngine {
    pub fn new(config: RiskRuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskRuleConfig {
        &self.config
    }

    pub fn assess_fibrosis(
        &self,
        calibration: &Calibration,
        uncertainty: &UncertaintyEstimate,
        quality: &QualityScores,
    ) -> RiskAssessment {
        let stage = calibration.stage;
        let mut factors = Vec::new();
        let mut urgency = Urgency::Routine;

        if stage.is_advanced() {
            factors.push(ADVANCED_FIBROSIS);
            urgency = if stage.is_terminal() {
                Urgency::Urgent
            } else {
                Urgency::Priority
            };
        }
        if uncertainty.epistemic > self.config.uncertainty_threshold {
            factors.push(HIGH_UNCERTAINTY);
        }
        if quality.overall < self.config.poor_quality_threshold {
            factors.push(POOR_QUALITY);
        }
        if quality.artifact > self.config.artifact_threshold {
            factors.push(SIGNIFICANT_ARTIFACTS);
        }
        if self.is_borderline(calibration.clamped_kpa) {
            factors.push(BORDERLINE_STAGE);
        }

        let risk_level = match stage {
            FibrosisStage::F4 => RiskLevel::Critical,
            FibrosisStage::F3 => RiskLevel::High,
            _ => level_from_factor_count(factors.len()),
        };

        let mut actions: Vec<String> = stage_actions(stage).iter().map(|a| a.to_string()).collect();
        for factor in &factors {
            let supplementary = match *factor {
                HIGH_UNCERTAINTY => Some("Consider repeat imaging or alternative assessment"),
                POOR_QUALITY | SIGNIFICANT_ARTIFACTS => Some("Repeat ultrasound with optimal technique"),
                BORDERLINE_STAGE => {
                    Some("Consider additional non-invasive assessment (e.g., MR elastography)")
                }
                _ => None,
            };
            if let Some(action) = supplementary {
                push_unique(&mut actions, action);
            }
        }

        tracing::debug!(
            stage = %stage,
            risk_level = %risk_level,
            factors = ?factors,
            "Fibrosis risk assessed"
        );

        RiskAssessment {
            risk_level,
            requires_review: !factors.is_empty(),
            urgency,
            risk_factors: factors.into_iter().map(String::from).collect(),
            recommended_actions: actions,
        }
    }

    /// `confidence` is the probability of the predicted class; `uncertainty`
    /// carries the mutual information as its epistemic term.
    pub fn assess_lesion(
        &self,
        class: LesionClass,
        confidence: f64,
        uncertainty: &UncertaintyEstimate,
    ) -> RiskAssessment {
        let significance = class.significance();
        let mut factors = Vec::new();

        if significance == ClinicalSignificance::Critical {
            factors.push(CRITICAL_PATHOLOGY);
        }
        if uncertainty.epistemic > self.config.lesion_uncertainty_threshold {
            factors.push(HIGH_UNCERTAINTY);
        }
        if confidence < self.config.low_confidence_threshold {
            factors.push(LOW_CONFIDENCE);
        }
        if significance == ClinicalSignificance::High
            && confidence < self.config.high_significance_confidence
        {
            factors.push(HIGH_SIGNIFICANCE_MODERATE_CONFIDENCE);
        }

        let risk_level = match significance {
            ClinicalSignificance::Critical => RiskLevel::Critical,
            ClinicalSignificance::High => RiskLevel::High,
            ClinicalSignificance::Low => level_from_factor_count(factors.len()),
        };

        let mut actions: Vec<String> = lesion_actions(class).iter().map(|a| a.to_string()).collect();
        if factors.contains(&HIGH_UNCERTAINTY) || factors.contains(&LOW_CONFIDENCE) {
            actions.push("Consider repeat imaging or expert review".to_string());
        }

        tracing::debug!(
            class = %class,
            confidence,
            risk_level = %risk_level,
            factors = ?factors,
            "Lesion risk assessed"
        );

        RiskAssessment {
            risk_level,
            requires_review: !factors.is_empty(),
            urgency: class.urgency(),
            risk_factors: factors.into_iter().map(String::from).collect(),
            recommended_actions: actions,
        }
    }

    fn is_borderline(&self, kpa: f64) -> bool {
        interior_boundaries().any(|boundary| (kpa - boundary).abs() < self.config.borderline_tolerance_kpa)
    }
}

fn level_from_factor_count(count: usize) -> RiskLevel {
    match count {
        0 => RiskLevel::Low,
        1 => RiskLevel::Moderate,
        _ => RiskLevel::High,
    }
}

fn push_unique(actions: &mut Vec<String>, action: &str) {
    if !actions.iter().any(|a| a == action) {
        actions.push(action.to_string());
    }
}

fn stage_actions(stage: FibrosisStage) -> &'static [&'static str] {
    match stage {
        FibrosisStage::F0 => &["Continue routine monitoring"],
        FibrosisStage::F1 => &[
            "Address underlying liver disease causes",
            "Lifestyle modifications",
            "Follow-up in 6-12 months",
        ],
        FibrosisStage::F2 => &[
            "Hepatology consultation recommended",
            "Investigate underlying etiology",
            "Consider treatment initiation",
            "Follow-up in 3-6 months",
        ],
        FibrosisStage::F3 => &[
            "Urgent hepatology referral",
            "HCC surveillance initiation",
            "Antiviral therapy if indicated",
            "Follow-up in 3 months",
        ],
        FibrosisStage::F4 => &[
            "Immediate hepatology consultation",
            "HCC surveillance program",
            "Liver transplant evaluation",
            "Variceal screening",
            "Regular monitoring",
        ],
    }
}

fn lesion_actions(class: LesionClass) -> &'static [&'static str] {
    match class {
        LesionClass::Hcc | LesionClass::Cca => &[
            "STAT oncology consultation",
            "Urgent CT/MRI with contrast",
            "Tumor markers (AFP, CA 19-9)",
            "Multidisciplinary team review",
        ],
        LesionClass::DysplasticNodule => &[
            "Urgent hepatology consultation",
            "Enhanced surveillance protocol",
            "Consider biopsy if indicated",
            "3-month follow-up imaging",
        ],
        LesionClass::Ffc | LesionClass::Ffs => &[
            "Evaluate for metabolic syndrome",
            "Liver function tests",
            "Consider lifestyle modifications",
            "Routine follow-up",
        ],
        LesionClass::Cyst | LesionClass::Hemangioma => &[
            "Routine monitoring",
            "Consider follow-up imaging in 6-12 months",
            "No immediate intervention required",
        ],
    }
}
