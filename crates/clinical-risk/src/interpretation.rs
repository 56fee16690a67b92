use hepatic_core::{FibrosisStage, LesionClass, QualityScores, UncertaintyEstimate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse three-way grading used in report text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Low,
    Moderate,
    High,
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Low => "low",
            Band::Moderate => "moderate",
            Band::High => "high",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInterpretation {
    pub primary: String,
    pub detailed: String,
    pub confidence_level: Band,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_assessment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty_level: Option<Band>,
}

pub fn interpret_fibrosis(
    stage: FibrosisStage,
    uncertainty: &UncertaintyEstimate,
    quality: &QualityScores,
) -> ClinicalInterpretation {
    let primary = match stage {
        FibrosisStage::F0 => "Normal liver stiffness. No significant fibrosis detected.",
        FibrosisStage::F1 => "Mild liver fibrosis. Consider monitoring and addressing underlying causes.",
        FibrosisStage::F2 => "Moderate liver fibrosis. Clinical follow-up recommended.",
        FibrosisStage::F3 => "Severe liver fibrosis. Specialist consultation advised.",
        FibrosisStage::F4 => "Cirrhosis detected. Immediate specialist referral recommended.",
    };

    let confidence_level = if uncertainty.epistemic < 0.2 {
        Band::High
    } else if uncertainty.epistemic < 0.4 {
        Band::Moderate
    } else {
        Band::Low
    };

    let quality_assessment = if quality.overall > 0.8 {
        "excellent"
    } else if quality.overall > 0.6 {
        "good"
    } else if quality.overall > 0.4 {
        "fair"
    } else {
        "poor"
    };

    let mut detailed = format!(
        "{primary} Prediction confidence: {confidence_level}. Image quality: {quality_assessment}."
    );
    if quality.artifact > 0.5 {
        detailed.push_str(" Significant artifacts detected - consider repeat imaging.");
    }

    ClinicalInterpretation {
        primary: primary.to_string(),
        detailed,
        confidence_level,
        quality_assessment: Some(quality_assessment.to_string()),
        uncertainty_level: None,
    }
}

pub fn interpret_lesion(
    class: LesionClass,
    confidence: f64,
    uncertainty: &UncertaintyEstimate,
) -> ClinicalInterpretation {
    let primary = match class {
        LesionClass::Ffc => "Focal fatty change detected. Usually benign but may indicate underlying metabolic conditions.",
        LesionClass::Ffs => "Focal fatty sparing identified. Typically benign finding in patients with fatty liver disease.",
        LesionClass::Hcc => "CRITICAL: Hepatocellular carcinoma suspected. Immediate oncology consultation required.",
        LesionClass::Cyst => "Liver cyst detected. Usually benign but may require monitoring for size changes.",
        LesionClass::Hemangioma => "Liver hemangioma identified. Benign vascular lesion, typically requires no treatment.",
        LesionClass::DysplasticNodule => "Dysplastic nodule detected. Precancerous lesion requiring urgent specialist evaluation.",
        LesionClass::Cca => "CRITICAL: Cholangiocarcinoma suspected. Immediate oncology consultation required.",
    };

    let confidence_level = if confidence > 0.8 {
        Band::High
    } else if confidence > 0.6 {
        Band::Moderate
    } else {
        Band::Low
    };

    let uncertainty_level = if uncertainty.epistemic < 0.3 {
        Band::Low
    } else if uncertainty.epistemic < 0.6 {
        Band::Moderate
    } else {
        Band::High
    };

    let mut detailed = format!(
        "{primary} AI confidence: {confidence_level} ({:.1}%). Prediction uncertainty: {uncertainty_level}.",
        confidence * 100.0
    );
    if class.is_malignant() {
        detailed.push_str(
            " This finding requires IMMEDIATE clinical correlation and specialist referral.",
        );
    }

    ClinicalInterpretation {
        primary: primary.to_string(),
        detailed,
        confidence_level,
        quality_assessment: None,
        uncertainty_level: Some(uncertainty_level),
    }
}
