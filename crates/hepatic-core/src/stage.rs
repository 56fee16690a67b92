//! Fibrosis staging table.
//!
//! Liver stiffness (kPa) buckets. Lower bounds are inclusive, upper bounds
//! exclusive, and the terminal bucket is unbounded above.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FibrosisStage {
    F0,
    F1,
    F2,
    F3,
    F4,
}

/// Numeric extent of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageRange {
    pub stage: FibrosisStage,
    pub lower_kpa: f64,
    pub upper_kpa: f64,
}

impl StageRange {
    /// Half-open membership `[lower, upper)`.
    pub fn contains(&self, kpa: f64) -> bool {
        kpa >= self.lower_kpa && kpa < self.upper_kpa
    }

    /// Closed membership `[lower, upper]`.
    pub fn contains_closed(&self, kpa: f64) -> bool {
        kpa >= self.lower_kpa && kpa <= self.upper_kpa
    }

    pub fn clamp(&self, kpa: f64) -> f64 {
        kpa.max(self.lower_kpa).min(self.upper_kpa)
    }
}

pub const STAGE_TABLE: [StageRange; 5] = [
    StageRange { stage: FibrosisStage::F0, lower_kpa: 2.4, upper_kpa: 6.0 },
    StageRange { stage: FibrosisStage::F1, lower_kpa: 6.0, upper_kpa: 7.1 },
    StageRange { stage: FibrosisStage::F2, lower_kpa: 7.1, upper_kpa: 8.7 },
    StageRange { stage: FibrosisStage::F3, lower_kpa: 8.7, upper_kpa: 10.3 },
    StageRange { stage: FibrosisStage::F4, lower_kpa: 10.3, upper_kpa: f64::INFINITY },
];

impl FibrosisStage {
    pub const ALL: [FibrosisStage; 5] = [
        FibrosisStage::F0,
        FibrosisStage::F1,
        FibrosisStage::F2,
        FibrosisStage::F3,
        FibrosisStage::F4,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn range(&self) -> StageRange {
        STAGE_TABLE[self.index()]
    }

    /// Stage containing `kpa`.
    ///
    /// Values below the first lower bound fall into F0 and the last bucket is
    /// open above, so every non-NaN input maps to exactly one stage. NaN maps
    /// to F0; callers reject NaN before staging.
    pub fn from_kpa(kpa: f64) -> FibrosisStage {
        STAGE_TABLE
            .iter()
            .rev()
            .find(|range| kpa >= range.lower_kpa)
            .map(|range| range.stage)
            .unwrap_or(FibrosisStage::F0)
    }

    /// Parse a reference stage label such as `"F2"`, `"f2"` or `"2"`.
    /// Anything unrecognised (including `"Unknown"`) yields `None`.
    pub fn parse(label: &str) -> Option<FibrosisStage> {
        let trimmed = label.trim();
        let digits = trimmed
            .strip_prefix('F')
            .or_else(|| trimmed.strip_prefix('f'))
            .unwrap_or(trimmed);
        match digits {
            "0" => Some(FibrosisStage::F0),
            "1" => Some(FibrosisStage::F1),
            "2" => Some(FibrosisStage::F2),
            "3" => Some(FibrosisStage::F3),
            "4" => Some(FibrosisStage::F4),
            _ => None,
        }
    }

    /// F3 and F4.
    pub fn is_advanced(&self) -> bool {
        matches!(self, FibrosisStage::F3 | FibrosisStage::F4)
    }

    pub fn is_terminal(&self) -> bool {
        *self == FibrosisStage::F4
    }

    pub fn description(&self) -> &'static str {
        match self {
            FibrosisStage::F0 => "No significant fibrosis",
            FibrosisStage::F1 => "Mild fibrosis",
            FibrosisStage::F2 => "Moderate fibrosis",
            FibrosisStage::F3 => "Severe fibrosis",
            FibrosisStage::F4 => "Cirrhosis",
        }
    }
}

impl fmt::Display for FibrosisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.index())
    }
}

/// Boundaries shared by two adjacent stages.
pub fn interior_boundaries() -> impl Iterator<Item = f64> {
    STAGE_TABLE[1..].iter().map(|range| range.lower_kpa)
}
