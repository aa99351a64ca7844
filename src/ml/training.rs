//! Training pipeline: assemble, split, scale, then fit the baseline and the
//! cross-validated tuned model and evaluate both on the held-out split.

use crate::config::AppConfig;
use crate::frame::Record;
use crate::traits::Clock;

use super::evaluation::{RegressionEvaluator, RegressionMetric, RegressionSummary};
use super::features::{FeatureMatrix, LABEL_COLUMN, VectorAssembler};
use super::model::{Hyperparams, LinearModel, ModelBuilder, TrainingError};
use super::persistence::ModelArtifact;
use super::scaler::{FittedMinMaxScaler, MinMaxScaler};
use super::split::train_test_split;
use super::tuning::{CrossValidator, ParamGridBuilder};
use super::{FittedPipeline, MlError, ModelVariant};

/// Knobs of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub train_ratio: f64,
    pub seed: u64,
    pub cv_folds: usize,
    pub cv_parallelism: usize,
    pub max_iter_grid: Vec<u32>,
    /// Metric used both for cross-validation and test evaluation
    pub metric: RegressionMetric,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            seed: 23,
            cv_folds: 3,
            cv_parallelism: 2,
            max_iter_grid: vec![50, 100],
            metric: RegressionMetric::Rmse,
        }
    }
}

impl From<&AppConfig> for TrainingOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            train_ratio: config.split.train_ratio,
            seed: config.split.seed,
            cv_folds: config.training.cv_folds,
            cv_parallelism: config.training.cv_parallelism,
            max_iter_grid: config.training.max_iter_grid.clone(),
            metric: RegressionMetric::Rmse,
        }
    }
}

/// Scaled train/test splits plus the frozen transforms that produced them
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub assembler: VectorAssembler,
    pub scaler: FittedMinMaxScaler,
    pub train: FeatureMatrix,
    pub test: FeatureMatrix,
}

impl PreparedData {
    /// Freeze a fitted model together with this data's assembler and scaler
    pub fn pipeline(&self, model: LinearModel) -> FittedPipeline {
        FittedPipeline {
            assembler: self.assembler.clone(),
            scaler: self.scaler.clone(),
            model,
        }
    }

    pub fn test_labels(&self) -> &[f64] {
        self.test
            .labels
            .as_ref()
            .and_then(|l| l.as_slice())
            .unwrap_or(&[])
    }
}

/// Assemble labeled features, split them and fit the scaler on the training
/// rows only.
pub fn prepare<R, I>(records: I, options: &TrainingOptions) -> Result<PreparedData, MlError>
where
    R: Record,
    I: IntoIterator<Item = R>,
{
    let assembler = VectorAssembler::default().with_label(LABEL_COLUMN);
    let assembled = assembler.transform(records)?;

    let split = train_test_split(&assembled, options.train_ratio, options.seed);
    let scaler = MinMaxScaler::new().fit(&split.train)?;

    Ok(PreparedData {
        train: scaler.transform(&split.train)?,
        test: scaler.transform(&split.test)?,
        assembler,
        scaler,
    })
}

/// Cross-validation results kept for reporting
#[derive(Debug, Clone, PartialEq)]
pub struct CvReport {
    pub metric: RegressionMetric,
    /// Each grid entry with its mean fold metric
    pub scores: Vec<(Hyperparams, f64)>,
    pub best_params: Hyperparams,
}

/// One trained variant and how it did
#[derive(Debug, Clone)]
pub struct VariantReport {
    pub variant: ModelVariant,
    pub pipeline: FittedPipeline,
    /// Metric on the test split, NaN when the split is empty
    pub test_metric: f64,
    pub metric: RegressionMetric,
    pub test_summary: Option<RegressionSummary>,
    pub test_predictions: Vec<f64>,
    pub cv: Option<CvReport>,
}

impl VariantReport {
    pub fn training_summary(&self) -> &RegressionSummary {
        &self.pipeline.model.training_summary
    }

    /// Package the fitted pipeline for persistence
    pub fn to_artifact<C: Clock>(&self, clock: &C) -> ModelArtifact {
        ModelArtifact::new(
            clock,
            self.variant,
            self.pipeline.clone(),
            self.test_summary.as_ref(),
            self.test_predictions.len(),
        )
    }
}

/// Both variants from one training run
#[derive(Debug, Clone)]
pub struct TrainingResult {
    pub baseline: VariantReport,
    pub tuned: VariantReport,
}

impl TrainingResult {
    pub fn report(&self, variant: ModelVariant) -> &VariantReport {
        match variant {
            ModelVariant::Baseline => &self.baseline,
            ModelVariant::Tuned => &self.tuned,
        }
    }

    pub fn reports(&self) -> [&VariantReport; 2] {
        [&self.baseline, &self.tuned]
    }
}

/// Fit the baseline model with its fixed hyperparameters
pub fn train_baseline(
    prepared: &PreparedData,
    options: &TrainingOptions,
) -> Result<VariantReport, MlError> {
    let labels = prepared
        .train
        .labels
        .as_ref()
        .ok_or(TrainingError::MissingLabels)?;

    let model = ModelBuilder::new(Hyperparams::baseline()).fit(prepared.train.model_input(), labels)?;
    tracing::info!("Baseline fitted: {}", model.info());

    evaluate(ModelVariant::Baseline, prepared, model, None, options.metric)
}

/// Grid-search `max_iter` with k-fold cross-validation, refit on the full
/// training split
pub fn train_tuned(
    prepared: &PreparedData,
    options: &TrainingOptions,
) -> Result<VariantReport, MlError> {
    let grid = ParamGridBuilder::new(Hyperparams::default())
        .add_max_iter(options.max_iter_grid.iter().copied())
        .build();

    let cv_model = CrossValidator::new(grid)
        .with_evaluator(RegressionEvaluator::new(options.metric))
        .with_num_folds(options.cv_folds)
        .with_parallelism(options.cv_parallelism)
        .with_seed(options.seed)
        .fit(&prepared.train)?;

    tracing::info!(
        "Tuned fitted (best max_iter={}): {}",
        cv_model.best_params.max_iter,
        cv_model.best_model.info()
    );

    let cv = CvReport {
        metric: cv_model.metric,
        scores: cv_model
            .grid
            .iter()
            .copied()
            .zip(cv_model.avg_metrics.iter().copied())
            .collect(),
        best_params: cv_model.best_params,
    };

    evaluate(
        ModelVariant::Tuned,
        prepared,
        cv_model.best_model,
        Some(cv),
        options.metric,
    )
}

/// Train both variants
pub fn train_models(
    prepared: &PreparedData,
    options: &TrainingOptions,
) -> Result<TrainingResult, MlError> {
    Ok(TrainingResult {
        baseline: train_baseline(prepared, options)?,
        tuned: train_tuned(prepared, options)?,
    })
}

fn evaluate(
    variant: ModelVariant,
    prepared: &PreparedData,
    model: LinearModel,
    cv: Option<CvReport>,
    metric: RegressionMetric,
) -> Result<VariantReport, MlError> {
    let test_predictions = model.predict(prepared.test.model_input())?.to_vec();
    let test_labels = prepared.test_labels();

    let test_metric = RegressionEvaluator::new(metric).evaluate(&test_predictions, test_labels);
    let test_summary = (!test_labels.is_empty())
        .then(|| RegressionSummary::compute(&test_predictions, test_labels));

    if test_labels.is_empty() {
        tracing::warn!("{} model: test split is empty, no test metrics", variant);
    } else {
        tracing::info!(
            "{} model: train MAE = {:.4}, test {} = {:.4}",
            variant,
            model.training_summary.mae,
            metric,
            test_metric
        );
    }

    Ok(VariantReport {
        variant,
        pipeline: prepared.pipeline(model),
        test_metric,
        metric,
        test_summary,
        test_predictions,
        cv,
    })
}
