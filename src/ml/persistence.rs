//! Model persistence - save and load fitted pipelines
//!
//! An artifact is a directory holding `metadata.json` (human-readable summary)
//! and `pipeline.bin` (bincode of the frozen assembler, scaler and model).

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::traits::Clock;

use super::evaluation::RegressionSummary;
use super::model::{Hyperparams, Solver};
use super::{FittedPipeline, ModelVariant};

pub const METADATA_FILE: &str = "metadata.json";
pub const PIPELINE_FILE: &str = "pipeline.bin";

/// Metrics recorded with an artifact. Non-finite values are stored as absent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactMetrics {
    pub train_mae: Option<f64>,
    pub train_rmse: Option<f64>,
    pub test_mae: Option<f64>,
    pub test_rmse: Option<f64>,
}

impl ArtifactMetrics {
    pub fn new(training: &RegressionSummary, test: Option<&RegressionSummary>) -> Self {
        Self {
            train_mae: finite(training.mae),
            train_rmse: finite(training.rmse),
            test_mae: test.and_then(|t| finite(t.mae)),
            test_rmse: test.and_then(|t| finite(t.rmse)),
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Serializable description of a saved pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Version for backward compatibility
    pub version: u32,
    pub variant: ModelVariant,
    /// When the model was trained
    pub created_at: DateTime<Utc>,
    pub solver: Solver,
    pub hyperparams: Hyperparams,
    pub feature_columns: Vec<String>,
    pub label_column: Option<String>,
    pub metrics: ArtifactMetrics,
    pub training_samples: usize,
    pub test_samples: usize,
}

impl ArtifactMetadata {
    /// Current version number
    pub const CURRENT_VERSION: u32 = 1;

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} v{}: {} train / {} test samples, train_mae={}, test_rmse={}, created {}",
            self.variant,
            self.version,
            self.training_samples,
            self.test_samples,
            format_metric(self.metrics.train_mae),
            format_metric(self.metrics.test_rmse),
            self.created_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

fn format_metric(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "N/A".to_string())
}

/// A fitted pipeline plus its metadata, as stored on disk
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub metadata: ArtifactMetadata,
    pub pipeline: FittedPipeline,
}

impl ModelArtifact {
    /// Wrap a fitted pipeline, stamping it with the clock's current time
    pub fn new<C: Clock>(
        clock: &C,
        variant: ModelVariant,
        pipeline: FittedPipeline,
        test_summary: Option<&RegressionSummary>,
        test_samples: usize,
    ) -> Self {
        let model = &pipeline.model;
        let metadata = ArtifactMetadata {
            version: ArtifactMetadata::CURRENT_VERSION,
            variant,
            created_at: clock.now_utc(),
            solver: model.solver(),
            hyperparams: *model.hyperparams(),
            feature_columns: pipeline.assembler.input_columns().to_vec(),
            label_column: pipeline.assembler.label_column().map(str::to_string),
            metrics: ArtifactMetrics::new(&model.training_summary, test_summary),
            training_samples: model.training_summary.n_samples,
            test_samples,
        };

        Self { metadata, pipeline }
    }

    /// Write the artifact into `dir`, replacing anything already there
    pub fn save(&self, dir: &Path) -> Result<(), PersistenceError> {
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| PersistenceError::IoError(e.to_string()))?;
        }
        fs::create_dir_all(dir).map_err(|e| PersistenceError::IoError(e.to_string()))?;

        let metadata = serde_json::to_vec_pretty(&self.metadata)
            .map_err(|e| PersistenceError::SerializeError(e.to_string()))?;
        fs::write(dir.join(METADATA_FILE), metadata)
            .map_err(|e| PersistenceError::IoError(e.to_string()))?;

        let pipeline = bincode::serialize(&self.pipeline)
            .map_err(|e| PersistenceError::SerializeError(e.to_string()))?;
        fs::write(dir.join(PIPELINE_FILE), pipeline)
            .map_err(|e| PersistenceError::IoError(e.to_string()))?;

        tracing::info!("Saved {} model to {}", self.metadata.variant, dir.display());
        Ok(())
    }

    /// Load an artifact previously written by [`ModelArtifact::save`]
    pub fn load(dir: &Path) -> Result<Self, PersistenceError> {
        let metadata_path = dir.join(METADATA_FILE);
        let pipeline_path = dir.join(PIPELINE_FILE);

        for path in [&metadata_path, &pipeline_path] {
            if !path.exists() {
                return Err(PersistenceError::FileNotFound(
                    path.to_string_lossy().to_string(),
                ));
            }
        }

        let bytes =
            fs::read(&metadata_path).map_err(|e| PersistenceError::IoError(e.to_string()))?;
        let metadata: ArtifactMetadata = serde_json::from_slice(&bytes)
            .map_err(|e| PersistenceError::DeserializeError(e.to_string()))?;

        // Version check
        if metadata.version != ArtifactMetadata::CURRENT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: ArtifactMetadata::CURRENT_VERSION,
                found: metadata.version,
            });
        }

        let bytes =
            fs::read(&pipeline_path).map_err(|e| PersistenceError::IoError(e.to_string()))?;
        let pipeline: FittedPipeline = bincode::deserialize(&bytes)
            .map_err(|e| PersistenceError::DeserializeError(e.to_string()))?;

        tracing::debug!("Loaded {}", metadata.summary());
        Ok(Self { metadata, pipeline })
    }
}

/// Errors that can occur during model persistence
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Model file not found: {0}")]
    FileNotFound(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializeError(String),
    #[error("Deserialization error: {0}")]
    DeserializeError(String),
    #[error("Model version mismatch: expected v{expected}, found v{found}")]
    VersionMismatch { expected: u32, found: u32 },
}
