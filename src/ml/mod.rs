//! Machine learning module for weighted-price regression
//!
//! Feature assembly, min-max scaling, linear regression (closed-form or
//! elastic-net), cross-validated tuning, persistence and inference.

pub mod evaluation;
pub mod features;
pub mod inference;
pub mod model;
pub mod persistence;
pub mod scaler;
pub mod split;
pub mod training;
pub mod tuning;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::SchemaError;

pub use evaluation::{RegressionEvaluator, RegressionMetric, RegressionSummary};
pub use features::{FEATURE_COLUMNS, FeatureMatrix, LABEL_COLUMN, VectorAssembler};
pub use inference::PredictionRow;
pub use model::{Hyperparams, LinearModel, ModelBuilder, Solver, TrainingError};
pub use persistence::{ArtifactMetadata, ModelArtifact, PersistenceError};
pub use scaler::{FittedMinMaxScaler, MinMaxScaler, ScalerError};
pub use split::{TrainTestSplit, train_test_split};
pub use training::{PreparedData, TrainingOptions, TrainingResult, VariantReport};
pub use tuning::{CrossValidator, CrossValidatorModel, ParamGridBuilder};

/// Which of the two trained models an artifact or inference run refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Fixed hyperparameters
    Baseline,
    /// Selected by cross-validated grid search
    Tuned,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Baseline, ModelVariant::Tuned];

    /// Directory name of the variant's artifact
    pub fn dir_name(&self) -> &'static str {
        match self {
            ModelVariant::Baseline => "baseline",
            ModelVariant::Tuned => "tuned",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(ModelVariant::Baseline),
            "tuned" => Ok(ModelVariant::Tuned),
            other => Err(format!("unknown model variant '{}'", other)),
        }
    }
}

/// Frozen assembler, scaler and model, threaded from training to inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub assembler: VectorAssembler,
    pub scaler: FittedMinMaxScaler,
    pub model: LinearModel,
}

/// Any failure inside the feature/model pipeline
#[derive(Debug, Error)]
pub enum MlError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Scaler(#[from] ScalerError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
