//! Focal liver lesion taxonomy used by the classification path.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Urgency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClinicalSignificance {
    Low,
    High,
    Critical,
}

/// Ordering follows the classifier's output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LesionClass {
    /// Focal fatty change
    #[serde(rename = "FFC")]
    Ffc,
    /// Focal fatty sparing
    #[serde(rename = "FFS")]
    Ffs,
    /// Hepatocellular carcinoma
    #[serde(rename = "HCC")]
    Hcc,
    Cyst,
    Hemangioma,
    #[serde(rename = "Dysplastic Nodule")]
    DysplasticNodule,
    /// Cholangiocarcinoma
    #[serde(rename = "CCA")]
    Cca,
}

impl LesionClass {
    /// Classifier output order.
    pub const ALL: [LesionClass; 7] = [
        LesionClass::Ffc,
        LesionClass::Ffs,
        LesionClass::Hcc,
        LesionClass::Cyst,
        LesionClass::Hemangioma,
        LesionClass::DysplasticNodule,
        LesionClass::Cca,
    ];

    pub const COUNT: usize = 7;

    pub fn from_index(index: usize) -> Option<LesionClass> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            LesionClass::Ffc => "FFC",
            LesionClass::Ffs => "FFS",
            LesionClass::Hcc => "HCC",
            LesionClass::Cyst => "Cyst",
            LesionClass::Hemangioma => "Hemangioma",
            LesionClass::DysplasticNodule => "Dysplastic Nodule",
            LesionClass::Cca => "CCA",
        }
    }

    pub fn significance(&self) -> ClinicalSignificance {
        match self {
            LesionClass::Hcc | LesionClass::Cca => ClinicalSignificance::Critical,
            LesionClass::DysplasticNodule => ClinicalSignificance::High,
            LesionClass::Ffc | LesionClass::Ffs | LesionClass::Cyst | LesionClass::Hemangioma => {
                ClinicalSignificance::Low
            }
        }
    }

    pub fn urgency(&self) -> Urgency {
        match self.significance() {
            ClinicalSignificance::Critical => Urgency::Stat,
            ClinicalSignificance::High => Urgency::Urgent,
            ClinicalSignificance::Low => Urgency::Routine,
        }
    }

    pub fn is_malignant(&self) -> bool {
        self.significance() == ClinicalSignificance::Critical
    }
}

impl fmt::Display for LesionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_names_match_display() {
        for class in LesionClass::ALL {
            let json = serde_json::to_string(&class).unwrap();
            assert_eq!(json, format!("\"{}\"", class.name()));
        }
    }

    #[test]
    fn test_taxonomy_order_matches_index() {
        for (i, class) in LesionClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
            assert_eq!(LesionClass::from_index(i), Some(*class));
        }
        assert_eq!(LesionClass::from_index(LesionClass::COUNT), None);
    }

    #[test]
    fn test_significance_tags() {
        assert_eq!(LesionClass::Hcc.urgency(), Urgency::Stat);
        assert_eq!(LesionClass::Cca.significance(), ClinicalSignificance::Critical);
        assert_eq!(LesionClass::DysplasticNodule.urgency(), Urgency::Urgent);
        assert_eq!(LesionClass::Cyst.urgency(), Urgency::Routine);
        let critical = LesionClass::ALL.iter().filter(|c| c.is_malignant()).count();
        assert_eq!(critical, 2);
    }
}
