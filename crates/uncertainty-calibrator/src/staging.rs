use hepatic_core::{FibrosisStage, InferenceError, InferenceResult};
use serde::{Deserialize, Serialize};

/// A stiffness estimate mapped onto the stage table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub raw_kpa: f64,
    pub clamped_kpa: f64,
    pub stage: FibrosisStage,
    pub reference: Option<FibrosisStage>,
}

/// Map `raw_kpa` to a stage, clipping into the reference stage's range when
/// one is supplied.
///
/// A clipped value may land exactly on the reference's upper bound (9.0 kPa
/// against F2 becomes 8.7). It still belongs to the reference stage, so the
/// range is treated as closed here rather than handing the value to the
/// next bucket.
pub fn calibrate(raw_kpa: f64, reference: Option<FibrosisStage>) -> InferenceResult<Calibration> {
    if raw_kpa.is_nan() {
        return Err(InferenceError::NumericInstability(
            "cannot stage a NaN stiffness estimate".to_string(),
        ));
    }

    let (clamped_kpa, stage) = match reference {
        Some(reference) => {
            let range = reference.range();
            let clamped = range.clamp(raw_kpa);
            debug_assert!(range.contains_closed(clamped));
            (clamped, reference)
        }
        None => (raw_kpa, FibrosisStage::from_kpa(raw_kpa)),
    };

    Ok(Calibration {
        raw_kpa,
        clamped_kpa,
        stage,
        reference,
    })
}

/// Map epistemic variance to a (0, 1] confidence score.
pub fn confidence_score(epistemic: f64) -> f64 {
    1.0 / (1.0 + epistemic.max(0.0))
}
