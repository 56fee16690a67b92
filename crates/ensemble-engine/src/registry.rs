use hepatic_core::{EmbeddingVector, InferenceError, InferenceResult, ViewType};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::classifier::LesionClassifier;
use crate::ensemble::PredictionEnsemble;
use crate::layer::validate_dropout;
use crate::quality::QualityAssessor;

/// Width of the view one-hot appended to the embedding for the fibrosis heads.
pub const METADATA_DIM: usize = 3;

/// Architecture used to initialise a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub embedding_dim: usize,
    pub ensemble_size: usize,
    pub head_hidden: Vec<usize>,
    pub head_dropout: f64,
    pub quality_hidden: Vec<usize>,
    pub classifier_hidden: Vec<usize>,
    pub classifier_dropout: f64,
    pub classifier_temperature: f64,
}

impl Default for ModelArchitecture {
    fn default() -> Self {
        Self {
            embedding_dim: 512,
            ensemble_size: PredictionEnsemble::DEFAULT_SIZE,
            head_hidden: vec![512, 256, 128],
            head_dropout: 0.15,
            quality_hidden: QualityAssessor::DEFAULT_HIDDEN.to_vec(),
            classifier_hidden: vec![512, 256],
            classifier_dropout: LesionClassifier::DEFAULT_DROPOUT,
            classifier_temperature: LesionClassifier::DEFAULT_TEMPERATURE,
        }
    }
}

impl ModelArchitecture {
    pub fn validate(&self) -> InferenceResult<()> {
        if self.embedding_dim == 0 {
            return Err(InferenceError::InvalidInput(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if self.ensemble_size < 2 {
            return Err(InferenceError::InvalidInput(format!(
                "ensemble size must be at least 2, got {}",
                self.ensemble_size
            )));
        }
        if self
            .head_hidden
            .iter()
            .chain(&self.quality_hidden)
            .chain(&self.classifier_hidden)
            .any(|w| *w == 0)
        {
            return Err(InferenceError::InvalidInput(
                "hidden layer widths must be positive".to_string(),
            ));
        }
        validate_dropout(self.head_dropout)?;
        validate_dropout(self.classifier_dropout)?;
        Ok(())
    }
}

/// Immutable bundle of every network the engine evaluates.
///
/// Built once and shared read-only (typically behind `Arc`) by all
/// concurrent inference calls.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    embedding_dim: usize,
    quality: QualityAssessor,
    fibrosis: PredictionEnsemble,
    lesion: LesionClassifier,
}

impl ModelRegistry {
    pub fn new(
        embedding_dim: usize,
        quality: QualityAssessor,
        fibrosis: PredictionEnsemble,
        lesion: LesionClassifier,
    ) -> InferenceResult<Self> {
        let checks = [
            ("quality assessor", quality.input_dim(), embedding_dim),
            ("fibrosis ensemble", fibrosis.input_dim(), embedding_dim + METADATA_DIM),
            ("lesion classifier", lesion.input_dim(), embedding_dim),
        ];
        for (name, actual, expected) in checks {
            if actual != expected {
                return Err(InferenceError::InvalidInput(format!(
                    "{name} expects {actual} inputs, registry requires {expected}"
                )));
            }
        }
        Ok(Self {
            embedding_dim,
            quality,
            fibrosis,
            lesion,
        })
    }

    /// Randomly initialise every network from `seed`.
    pub fn initialize(architecture: &ModelArchitecture, seed: u64) -> InferenceResult<Self> {
        architecture.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);

        let quality = QualityAssessor::initialize(architecture.embedding_dim, &architecture.quality_hidden, &mut rng)?;
        let fibrosis = PredictionEnsemble::initialize(
            architecture.ensemble_size,
            architecture.embedding_dim + METADATA_DIM,
            &architecture.head_hidden,
            architecture.head_dropout,
            &mut rng,
        )?;
        let lesion = LesionClassifier::initialize(
            architecture.embedding_dim,
            &architecture.classifier_hidden,
            architecture.classifier_dropout,
            architecture.classifier_temperature,
            &mut rng,
        )?;

        tracing::info!(
            "Model registry ready: embedding_dim={}, ensemble_heads={}, head_hidden={:?}, seed={}",
            architecture.embedding_dim,
            fibrosis.len(),
            architecture.head_hidden,
            seed
        );

        Self::new(architecture.embedding_dim, quality, fibrosis, lesion)
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn quality(&self) -> &QualityAssessor {
        &self.quality
    }

    pub fn fibrosis(&self) -> &PredictionEnsemble {
        &self.fibrosis
    }

    pub fn lesion(&self) -> &LesionClassifier {
        &self.lesion
    }

    /// `embedding ++ view one-hot`, after validating the embedding.
    pub fn fibrosis_input(&self, embedding: &EmbeddingVector, view: ViewType) -> InferenceResult<DVector<f64>> {
        self.check_embedding(embedding)?;
        Ok(DVector::from_iterator(
            self.embedding_dim + METADATA_DIM,
            embedding.as_slice().iter().copied().chain(view.one_hot()),
        ))
    }

    pub fn lesion_input(&self, embedding: &EmbeddingVector) -> InferenceResult<DVector<f64>> {
        self.check_embedding(embedding)?;
        Ok(DVector::from_column_slice(embedding.as_slice()))
    }

    fn check_embedding(&self, embedding: &EmbeddingVector) -> InferenceResult<()> {
        embedding.ensure_dim(self.embedding_dim)?;
        embedding.ensure_finite()
    }
}
