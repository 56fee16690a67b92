#[cfg(test)]
mod fixtures {
    use crate::config::EngineConfig;
    use crate::engine::InferenceEngine;
    use ensemble_engine::{
        DMatrix, DVector, DenseLayer, LesionClassifier, ModelArchitecture, ModelRegistry, PredictionEnsemble, PredictionHead,
        QualityAssessor,
    };
    use hepatic_core::{EmbeddingVector, QualityScores};
    use std::sync::Arc;

    pub const DIM: usize = 8;

    pub fn config() -> EngineConfig {
        EngineConfig {
            architecture: ModelArchitecture {
                embedding_dim: DIM,
                ensemble_size: 5,
                head_hidden: vec![16, 8],
                quality_hidden: vec![8],
                classifier_hidden: vec![16],
                ..ModelArchitecture::default()
            },
            mc_seed: Some(2024),
            ..EngineConfig::default()
        }
    }

    pub fn good_quality() -> QualityScores {
        QualityScores {
            overall: 0.9,
            blur: 0.1,
            noise: 0.1,
            artifact: 0.1,
        }
    }

    /// Engine whose heads report fixed means, so outputs are known exactly.
    pub fn fixed_engine(head_means: &[f64], logits: [f64; 7]) -> InferenceEngine {
        let heads = head_means
            .iter()
            .map(|mean| PredictionHead::constant(DIM + 3, &[4], *mean, 0.2f64.ln(), 0.15).unwrap())
            .collect();
        let registry = ModelRegistry::new(
            DIM,
            QualityAssessor::constant(DIM, good_quality()).unwrap(),
            PredictionEnsemble::new(heads).unwrap(),
            LesionClassifier::constant(DIM, &[4], logits, 0.2, 1.5).unwrap(),
        )
        .unwrap();
        InferenceEngine::new(Arc::new(registry), config()).unwrap()
    }

    /// Heads with four always-on hidden units, each pulling the mean by
    /// `weight`. Dropout at 0.5 swings every head's mean, so the ensemble
    /// mean varies between draws while its expectation stays at `mean`.
    pub fn dropout_engine(mean: f64, weight: f64) -> InferenceEngine {
        let width = 4;
        let heads = (0..5)
            .map(|_| {
                let hidden = DenseLayer::constant(DIM + 3, &vec![1.0; width]);
                let mut weights = DMatrix::zeros(2, width);
                weights.row_mut(0).fill(weight);
                let bias = DVector::from_vec(vec![mean - width as f64 * weight, 0.2f64.ln()]);
                let output = DenseLayer::new(weights, bias).unwrap();
                PredictionHead::new(vec![hidden], output, 0.5).unwrap()
            })
            .collect();
        let registry = ModelRegistry::new(
            DIM,
            QualityAssessor::constant(DIM, good_quality()).unwrap(),
            PredictionEnsemble::new(heads).unwrap(),
            LesionClassifier::constant(DIM, &[4], [0.0; 7], 0.2, 1.5).unwrap(),
        )
        .unwrap();
        InferenceEngine::new(Arc::new(registry), config()).unwrap()
    }

    pub fn random_engine() -> InferenceEngine {
        InferenceEngine::from_config(config()).unwrap()
    }

    pub fn embedding() -> EmbeddingVector {
        EmbeddingVector::new((0..DIM).map(|i| (i as f64 * 0.45).sin()).collect())
    }
}

#[cfg(test)]
mod fibrosis_tests {
    use super::fixtures::*;
    use crate::engine::FibrosisRequest;
    use clinical_risk::rules::HIGH_UNCERTAINTY;
    use hepatic_core::{
        EmbeddingVector, FibrosisStage, InferenceError, InferenceMode, RiskLevel, ViewMetadata,
        ViewType,
    };

    fn request(mode: InferenceMode) -> FibrosisRequest {
        FibrosisRequest {
            embedding: embedding(),
            view: ViewType::Intercostal.into(),
            mode,
            num_samples: None,
            reference_stage: None,
            confidence: None,
        }
    }

    #[test]
    fn test_mid_f1_estimate_needs_no_review() {
        let engine = fixed_engine(&[6.5; 5], [0.0; 7]);
        for mode in [InferenceMode::Fast, InferenceMode::Uncertainty] {
            let report = engine.infer_fibrosis(&request(mode)).unwrap();
            assert!((report.mean_kpa - 6.5).abs() < 1e-9);
            assert_eq!(report.stage, FibrosisStage::F1);
            assert!(!report.risk.requires_review, "{mode:?}");
            assert_eq!(report.risk.risk_level, RiskLevel::Low);
            assert!(report.epistemic.abs() < 1e-9);
            assert!((report.aleatoric - 0.2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_reference_stage_clamps_point_estimate_only() {
        let engine = fixed_engine(&[9.0; 5], [0.0; 7]);
        for label in ["2", "F2"] {
            let report = engine
                .infer_fibrosis(&FibrosisRequest {
                    reference_stage: Some(label.to_string()),
                    ..request(InferenceMode::Fast)
                })
                .unwrap();
            assert!((report.mean_kpa - 9.0).abs() < 1e-9);
            assert_eq!(report.clamped_kpa, 8.7);
            assert_eq!(report.stage, FibrosisStage::F2);
            assert_eq!(report.reference_stage, Some(FibrosisStage::F2));
            // Interval stays centred on the unclamped estimate.
            assert!(report.prediction_interval.upper > 9.0);
        }
    }

    #[test]
    fn test_unrecognised_reference_is_ignored() {
        let engine = fixed_engine(&[9.0; 5], [0.0; 7]);
        let report = engine
            .infer_fibrosis(&FibrosisRequest {
                reference_stage: Some("Unknown".to_string()),
                ..request(InferenceMode::Fast)
            })
            .unwrap();
        assert!((report.clamped_kpa - 9.0).abs() < 1e-9);
        assert_eq!(report.stage, FibrosisStage::F3);
        assert_eq!(report.reference_stage, None);
    }

    #[test]
    fn test_head_disagreement_forces_review() {
        // Sample variance of these head means is 0.35.
        let spread = 0.7f64.sqrt();
        let engine = fixed_engine(&[6.5 - spread, 6.5 + spread, 6.5, 6.5, 6.5], [0.0; 7]);
        let report = engine.infer_fibrosis(&request(InferenceMode::Fast)).unwrap();
        assert!((report.epistemic - 0.35).abs() < 1e-9);
        assert!((report.quality.overall - 0.9).abs() < 1e-9);
        assert!(report.risk.requires_review);
        assert!(report.risk.risk_level >= RiskLevel::Moderate);
        assert_eq!(report.risk.risk_factors, vec![HIGH_UNCERTAINTY]);
    }

    #[test]
    fn test_unstable_draws_force_review() {
        // Per-draw variance of the ensemble mean is 4 * 1.6^2 / 5 ~= 2.0.
        let engine = dropout_engine(6.5, 1.6);
        let report = engine
            .infer_fibrosis(&FibrosisRequest {
                num_samples: Some(50),
                ..request(InferenceMode::Uncertainty)
            })
            .unwrap();
        assert_eq!(report.num_samples, 50);
        assert!(report.epistemic > 0.3, "epistemic {}", report.epistemic);
        assert!(report.risk.requires_review);
        assert!(report.risk.risk_level >= RiskLevel::Moderate);
        assert!(report.risk.risk_factors.contains(&HIGH_UNCERTAINTY.to_string()));

        // Without dropout the same heads agree exactly.
        let fast = engine.infer_fibrosis(&request(InferenceMode::Fast)).unwrap();
        assert!(fast.epistemic.abs() < 1e-9);
        assert!((fast.mean_kpa - 6.5).abs() < 1e-9);
    }

    #[test]
    fn test_monte_carlo_run_invariants() {
        let engine = random_engine();
        let report = engine.infer_fibrosis(&request(InferenceMode::Uncertainty)).unwrap();
        assert_eq!(report.num_samples, 50);
        assert!(report.epistemic >= 0.0);
        assert!(report.aleatoric > 0.0);
        assert_eq!(report.total_uncertainty, report.epistemic + report.aleatoric);
        assert!(report.prediction_interval.lower >= 0.0);
        assert!(report.prediction_interval.upper >= report.prediction_interval.lower);
        assert!(report.confidence_score > 0.0 && report.confidence_score <= 1.0);
    }

    #[test]
    fn test_fast_mode_is_bit_identical() {
        let engine = random_engine();
        let a = engine.infer_fibrosis(&request(InferenceMode::Fast)).unwrap();
        let b = engine.infer_fibrosis(&request(InferenceMode::Fast)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.mean_kpa.to_bits(), b.mean_kpa.to_bits());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert_eq!(a.num_samples, 1);
    }

    #[test]
    fn test_seeded_monte_carlo_is_reproducible() {
        let engine = random_engine();
        let req = FibrosisRequest {
            num_samples: Some(12),
            ..request(InferenceMode::Uncertainty)
        };
        assert_eq!(engine.infer_fibrosis(&req).unwrap(), engine.infer_fibrosis(&req).unwrap());
    }

    #[test]
    fn test_wider_interval_at_99_percent() {
        let engine = random_engine();
        let p95 = engine.infer_fibrosis(&request(InferenceMode::Fast)).unwrap();
        let p99 = engine
            .infer_fibrosis(&FibrosisRequest {
                confidence: Some(0.99),
                ..request(InferenceMode::Fast)
            })
            .unwrap();
        assert_eq!(p99.prediction_interval.confidence, 0.99);
        assert!(p99.prediction_interval.upper > p95.prediction_interval.upper);
    }

    #[test]
    fn test_input_errors() {
        let engine = random_engine();
        let bad_dim = FibrosisRequest {
            embedding: EmbeddingVector::new(vec![0.0; DIM + 1]),
            ..request(InferenceMode::Fast)
        };
        assert!(engine.infer_fibrosis(&bad_dim).unwrap_err().is_input_error());

        let mut values = vec![0.1; DIM];
        values[2] = f64::NAN;
        let nan = FibrosisRequest {
            embedding: EmbeddingVector::new(values),
            ..request(InferenceMode::Fast)
        };
        assert!(engine.infer_fibrosis(&nan).unwrap_err().is_input_error());

        let bad_view = FibrosisRequest {
            view: ViewMetadata::OneHot(vec![1.0, 1.0, 0.0]),
            ..request(InferenceMode::Fast)
        };
        assert!(matches!(
            engine.infer_fibrosis(&bad_view),
            Err(InferenceError::InvalidInput(_))
        ));

        let bad_level = FibrosisRequest {
            confidence: Some(0.9),
            ..request(InferenceMode::Fast)
        };
        assert_eq!(
            engine.infer_fibrosis(&bad_level).unwrap_err(),
            InferenceError::UnsupportedConfidence(0.9)
        );

        let one_sample = FibrosisRequest {
            num_samples: Some(1),
            ..request(InferenceMode::Uncertainty)
        };
        assert!(engine.infer_fibrosis(&one_sample).unwrap_err().is_input_error());
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_failures() {
        let engine = fixed_engine(&[6.5; 5], [0.0; 7]);
        let requests = vec![
            request(InferenceMode::Fast),
            FibrosisRequest {
                embedding: EmbeddingVector::new(vec![0.0; 3]),
                ..request(InferenceMode::Fast)
            },
            FibrosisRequest {
                reference_stage: Some("F0".to_string()),
                ..request(InferenceMode::Fast)
            },
        ];
        let results = engine.infer_fibrosis_batch(&requests);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().stage, FibrosisStage::F1);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().clamped_kpa, 6.0);
        assert_eq!(results[2].as_ref().unwrap().stage, FibrosisStage::F0);
    }

    #[test]
    fn test_request_json_accepts_one_hot_metadata() {
        let json = format!(
            r#"{{"embedding": {:?}, "metadata": [0.0, 0.0, 1.0], "mode": "fast", "reference_stage": "F1"}}"#,
            vec![0.25; DIM]
        );
        let request: FibrosisRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request.view.resolve().unwrap(), ViewType::LiverRightKidney);
        assert_eq!(request.mode, InferenceMode::Fast);
        assert_eq!(request.num_samples, None);

        let named: FibrosisRequest =
            serde_json::from_str(&format!(r#"{{"embedding": {:?}, "view": "Intercostal"}}"#, vec![0.0; DIM]))
                .unwrap();
        assert_eq!(named.mode, InferenceMode::Uncertainty);
    }
}

#[cfg(test)]
mod lesion_tests {
    use super::fixtures::*;
    use crate::engine::LesionRequest;
    use hepatic_core::{ClinicalSignificance, InferenceMode, LesionClass, RiskLevel, Urgency};

    fn request(mode: InferenceMode) -> LesionRequest {
        LesionRequest {
            embedding: embedding(),
            mode,
            num_samples: None,
        }
    }

    #[test]
    fn test_confident_malignancy_is_critical() {
        let engine = fixed_engine(&[6.5; 5], [0.0, 0.0, 8.0, 0.0, 0.0, 0.0, 0.0]);
        for mode in [InferenceMode::Fast, InferenceMode::Uncertainty] {
            let report = engine.classify_lesion(&request(mode)).unwrap();
            assert_eq!(report.predicted_class, LesionClass::Hcc);
            assert!(report.confidence_score > 0.95);
            assert_eq!(report.clinical_significance, ClinicalSignificance::Critical);
            assert_eq!(report.recommended_urgency, Urgency::Stat);
            assert_eq!(report.risk.risk_level, RiskLevel::Critical);
            assert!(report.risk.requires_review);
            assert!(report.epistemic >= 0.0 && report.epistemic < 1e-6);
        }
    }

    #[test]
    fn test_fast_mode_has_no_epistemic_term() {
        let engine = random_engine();
        let a = engine.classify_lesion(&request(InferenceMode::Fast)).unwrap();
        assert_eq!(a.epistemic, 0.0);
        assert!(a.aleatoric > 0.0);
        assert_eq!(a.num_samples, 1);
        assert_eq!(a, engine.classify_lesion(&request(InferenceMode::Fast)).unwrap());
    }

    #[test]
    fn test_monte_carlo_classification() {
        let engine = random_engine();
        let report = engine.classify_lesion(&request(InferenceMode::Uncertainty)).unwrap();
        assert_eq!(report.num_samples, 30);
        assert_eq!(report.class_probabilities.len(), LesionClass::COUNT);
        assert!((report.class_probabilities.values().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(report.epistemic >= 0.0);
        assert_eq!(report.total_uncertainty, report.epistemic + report.aleatoric);
        let best = report
            .class_probabilities
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(report.confidence_score, best);
    }

    #[test]
    fn test_report_keys_use_clinical_names() {
        let engine = fixed_engine(&[6.5; 5], [0.0, 0.0, 8.0, 0.0, 0.0, 0.0, 0.0]);
        let report = engine.classify_lesion(&request(InferenceMode::Fast)).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["class_probabilities"]["HCC"].as_f64().unwrap() > 0.95);
        assert!(json["class_probabilities"]["Dysplastic Nodule"].is_number());
        assert_eq!(json["predicted_class"], "HCC");
        assert_eq!(json["risk"]["risk_level"], "critical");
    }

    #[test]
    fn test_batch_classification() {
        let engine = random_engine();
        let results = engine.classify_lesion_batch(&[request(InferenceMode::Fast), request(InferenceMode::Fast)]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), results[1].as_ref().unwrap());
    }
}

#[cfg(test)]
mod provider_tests {
    use super::fixtures::*;
    use crate::engine::{FibrosisRequest, LesionRequest};
    use crate::provider::ClinicalInference;
    use hepatic_core::{InferenceError, InferenceMode, ViewType};
    use std::time::{Duration, Instant};

    fn fibrosis_request() -> FibrosisRequest {
        FibrosisRequest {
            embedding: embedding(),
            view: ViewType::SubcostalHepaticVein.into(),
            mode: InferenceMode::Fast,
            num_samples: None,
            reference_stage: None,
            confidence: None,
        }
    }

    #[tokio::test]
    async fn test_async_matches_sync() {
        let engine = random_engine();
        let sync = engine.infer_fibrosis(&fibrosis_request()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(30);
        let report = engine
            .submit_fibrosis(fibrosis_request(), Some(deadline))
            .await
            .unwrap();
        assert_eq!(report, sync);
    }

    #[tokio::test]
    async fn test_expired_deadline_rejected_before_dispatch() {
        let engine = random_engine();
        let err = engine
            .submit_fibrosis(fibrosis_request(), Some(Instant::now()))
            .await
            .unwrap_err();
        assert_eq!(err, InferenceError::DeadlineExceeded);

        let err = engine
            .submit_lesion(
                LesionRequest {
                    embedding: embedding(),
                    mode: InferenceMode::Fast,
                    num_samples: None,
                },
                Some(Instant::now()),
            )
            .await
            .unwrap_err();
        assert_eq!(err, InferenceError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_batch_deadline_reported_per_item() {
        let engine = random_engine();
        let results = engine
            .submit_fibrosis_batch(vec![fibrosis_request(), fibrosis_request()], Some(Instant::now()))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r == &Err(InferenceError::DeadlineExceeded)));

        let results = engine
            .submit_fibrosis_batch(vec![fibrosis_request(), fibrosis_request()], None)
            .await
            .unwrap();
        let sync = engine.infer_fibrosis(&fibrosis_request()).unwrap();
        assert!(results.iter().all(|r| r.as_ref() == Ok(&sync)));

        let lesions = engine
            .submit_lesion_batch(
                vec![LesionRequest {
                    embedding: embedding(),
                    mode: InferenceMode::Fast,
                    num_samples: None,
                }],
                Some(Instant::now()),
            )
            .await
            .unwrap();
        assert_eq!(lesions, vec![Err(InferenceError::DeadlineExceeded)]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_registry() {
        let engine = random_engine();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.submit_fibrosis(fibrosis_request(), None).await })
            })
            .collect();
        let mut reports = Vec::new();
        for handle in handles {
            reports.push(handle.await.unwrap().unwrap());
        }
        assert!(reports.windows(2).all(|w| w[0] == w[1]));
    }
}
