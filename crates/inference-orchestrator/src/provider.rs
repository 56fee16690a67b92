use async_trait::async_trait;
use hepatic_core::{InferenceError, InferenceResult};
use rayon::prelude::*;
use std::time::Instant;

use crate::engine::{FibrosisReport, FibrosisRequest, InferenceEngine, LesionReport, LesionRequest};

/// Async entry point for callers on a tokio runtime.
///
/// Inference is CPU-bound, so each call runs on the blocking pool. A deadline
/// is only honoured at the call boundary: once computation starts it runs to
/// completion.
#[async_trait]
pub trait ClinicalInference: Send + Sync {
    async fn submit_fibrosis(
        &self,
        request: FibrosisRequest,
        deadline: Option<Instant>,
    ) -> InferenceResult<FibrosisReport>;

    async fn submit_lesion(
        &self,
        request: LesionRequest,
        deadline: Option<Instant>,
    ) -> InferenceResult<LesionReport>;

    /// Results keep request order. The deadline is checked per item before it
    /// starts; items it catches report `DeadlineExceeded` in place.
    async fn submit_fibrosis_batch(
        &self,
        requests: Vec<FibrosisRequest>,
        deadline: Option<Instant>,
    ) -> InferenceResult<Vec<InferenceResult<FibrosisReport>>>;

    async fn submit_lesion_batch(
        &self,
        requests: Vec<LesionRequest>,
        deadline: Option<Instant>,
    ) -> InferenceResult<Vec<InferenceResult<LesionReport>>>;
}

#[async_trait]
impl ClinicalInference for InferenceEngine {
    async fn submit_fibrosis(
        &self,
        request: FibrosisRequest,
        deadline: Option<Instant>,
    ) -> InferenceResult<FibrosisReport> {
        check_deadline(deadline)?;
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            check_deadline(deadline)?;
            engine.infer_fibrosis(&request)
        })
        .await
        .map_err(|e| InferenceError::Worker(e.to_string()))?
    }

    async fn submit_lesion(
        &self,
        request: LesionRequest,
        deadline: Option<Instant>,
    ) -> InferenceResult<LesionReport> {
        check_deadline(deadline)?;
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            check_deadline(deadline)?;
            engine.classify_lesion(&request)
        })
        .await
        .map_err(|e| InferenceError::Worker(e.to_string()))?
    }

    async fn submit_fibrosis_batch(
        &self,
        requests: Vec<FibrosisRequest>,
        deadline: Option<Instant>,
    ) -> InferenceResult<Vec<InferenceResult<FibrosisReport>>> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            requests
                .par_iter()
                .map(|request| {
                    check_deadline(deadline)?;
                    engine.infer_fibrosis(request)
                })
                .collect()
        })
        .await
        .map_err(|e| InferenceError::Worker(e.to_string()))
    }

    async fn submit_lesion_batch(
        &self,
        requests: Vec<LesionRequest>,
        deadline: Option<Instant>,
    ) -> InferenceResult<Vec<InferenceResult<LesionReport>>> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            requests
                .par_iter()
                .map(|request| {
                    check_deadline(deadline)?;
                    engine.classify_lesion(request)
                })
                .collect()
        })
        .await
        .map_err(|e| InferenceError::Worker(e.to_string()))
    }
}

fn check_deadline(deadline: Option<Instant>) -> InferenceResult<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            tracing::warn!("Inference deadline passed before computation started");
            Err(InferenceError::DeadlineExceeded)
        }
        _ => Ok(()),
    }
}
