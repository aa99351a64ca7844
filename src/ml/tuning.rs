//! Hyperparameter grid search with k-fold cross-validation.

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

use super::evaluation::{RegressionEvaluator, RegressionMetric};
use super::features::FeatureMatrix;
use super::model::{Hyperparams, LinearModel, ModelBuilder, TrainingError};
use super::split::random_partition;

/// Builds the cartesian product of hyperparameter values over a base setting
#[derive(Debug, Clone)]
pub struct ParamGridBuilder {
    base: Hyperparams,
    max_iter: Vec<u32>,
    reg_param: Vec<f64>,
    elastic_net_param: Vec<f64>,
}

impl ParamGridBuilder {
    pub fn new(base: Hyperparams) -> Self {
        Self {
            base,
            max_iter: Vec::new(),
            reg_param: Vec::new(),
            elastic_net_param: Vec::new(),
        }
    }

    pub fn add_max_iter(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.max_iter.extend(values);
        self
    }

    pub fn add_reg_param(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.reg_param.extend(values);
        self
    }

    pub fn add_elastic_net_param(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.elastic_net_param.extend(values);
        self
    }

    /// Every combination, varying the last-added dimension fastest.
    /// An axis with no values keeps the base setting.
    pub fn build(&self) -> Vec<Hyperparams> {
        let mut grid = vec![self.base];

        if !self.max_iter.is_empty() {
            grid = grid
                .iter()
                .flat_map(|p| self.max_iter.iter().map(move |&v| Hyperparams { max_iter: v, ..*p }))
                .collect();
        }
        if !self.reg_param.is_empty() {
            grid = grid
                .iter()
                .flat_map(|p| self.reg_param.iter().map(move |&v| Hyperparams { reg_param: v, ..*p }))
                .collect();
        }
        if !self.elastic_net_param.is_empty() {
            grid = grid
                .iter()
                .flat_map(|p| {
                    self.elastic_net_param
                        .iter()
                        .map(move |&v| Hyperparams { elastic_net_param: v, ..*p })
                })
                .collect();
        }

        grid
    }
}

/// Selects hyperparameters by mean k-fold metric, then refits on all data
#[derive(Debug, Clone)]
pub struct CrossValidator {
    grid: Vec<Hyperparams>,
    evaluator: RegressionEvaluator,
    num_folds: usize,
    parallelism: usize,
    seed: u64,
}

/// Outcome of a cross-validated search
#[derive(Debug, Clone)]
pub struct CrossValidatorModel {
    pub best_model: LinearModel,
    pub best_params: Hyperparams,
    pub grid: Vec<Hyperparams>,
    /// Mean validation metric per grid entry, in grid order
    pub avg_metrics: Vec<f64>,
    pub metric: RegressionMetric,
}

impl CrossValidator {
    pub fn new(grid: Vec<Hyperparams>) -> Self {
        Self {
            grid,
            evaluator: RegressionEvaluator::new(RegressionMetric::Rmse),
            num_folds: 3,
            parallelism: 1,
            seed: 23,
        }
    }

    pub fn with_evaluator(mut self, evaluator: RegressionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_num_folds(mut self, num_folds: usize) -> Self {
        self.num_folds = num_folds;
        self
    }

    /// Number of worker threads evaluating (params, fold) pairs
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit(&self, data: &FeatureMatrix) -> Result<CrossValidatorModel, TrainingError> {
        if self.grid.is_empty() {
            return Err(TrainingError::EmptyGrid);
        }
        if self.num_folds < 2 {
            return Err(TrainingError::InvalidFolds(self.num_folds));
        }
        let labels = data.labels.as_ref().ok_or(TrainingError::MissingLabels)?;
        let x = data.model_input();
        if x.nrows() < self.num_folds {
            return Err(TrainingError::InsufficientData(x.nrows()));
        }

        let folds = self.folds(x, labels);
        if folds.is_empty() {
            return Err(TrainingError::InsufficientData(x.nrows()));
        }

        let tasks: Vec<(usize, usize)> = (0..self.grid.len())
            .flat_map(|p| (0..folds.len()).map(move |f| (p, f)))
            .collect();

        let results = self.run_tasks(&tasks, &folds)?;

        let mut sums = vec![0.0; self.grid.len()];
        for ((param_idx, _), metric) in tasks.iter().zip(results) {
            sums[*param_idx] += metric;
        }
        let avg_metrics: Vec<f64> = sums.iter().map(|s| s / folds.len() as f64).collect();

        let mut best_idx = 0;
        for (i, &m) in avg_metrics.iter().enumerate().skip(1) {
            if self.evaluator.is_better(m, avg_metrics[best_idx]) {
                best_idx = i;
            }
        }

        for (params, metric) in self.grid.iter().zip(&avg_metrics) {
            tracing::debug!(
                "CV max_iter={} reg={} l1={} -> mean {}={:.6}",
                params.max_iter,
                params.reg_param,
                params.elastic_net_param,
                self.evaluator.metric(),
                metric
            );
        }

        let best_params = self.grid[best_idx];
        let best_model = ModelBuilder::new(best_params).fit(x, labels)?;
        tracing::info!(
            "Cross-validation picked max_iter={} ({} folds, mean {}={:.6})",
            best_params.max_iter,
            folds.len(),
            self.evaluator.metric(),
            avg_metrics[best_idx]
        );

        Ok(CrossValidatorModel {
            best_model,
            best_params,
            grid: self.grid.clone(),
            avg_metrics,
            metric: self.evaluator.metric(),
        })
    }

    /// Seeded fold assignment; folds that leave either side empty are skipped
    fn folds(&self, x: &Array2<f64>, y: &Array1<f64>) -> Vec<Fold> {
        let weights = vec![1.0; self.num_folds];
        let buckets = random_partition(x.nrows(), &weights, self.seed);

        buckets
            .iter()
            .enumerate()
            .filter_map(|(k, valid_idx)| {
                let mut train_idx: Vec<usize> = buckets
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != k)
                    .flat_map(|(_, b)| b.iter().copied())
                    .collect();
                train_idx.sort_unstable();

                if train_idx.is_empty() || valid_idx.is_empty() {
                    return None;
                }

                Some(Fold {
                    train_x: x.select(Axis(0), &train_idx),
                    train_y: y.select(Axis(0), &train_idx),
                    valid_x: x.select(Axis(0), valid_idx),
                    valid_y: y.select(Axis(0), valid_idx),
                })
            })
            .collect()
    }

    /// Evaluate every task on a pool of `parallelism` threads.
    /// Results come back in task order.
    fn run_tasks(&self, tasks: &[(usize, usize)], folds: &[Fold]) -> Result<Vec<f64>, TrainingError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .build()
            .map_err(|e| TrainingError::ThreadPool(e.to_string()))?;

        pool.install(|| {
            tasks
                .par_iter()
                .map(|&(param_idx, fold_idx)| self.evaluate_task(param_idx, &folds[fold_idx]))
                .collect()
        })
    }

    fn evaluate_task(&self, param_idx: usize, fold: &Fold) -> Result<f64, TrainingError> {
        let model = ModelBuilder::new(self.grid[param_idx]).fit(&fold.train_x, &fold.train_y)?;
        let predictions = model.predict(&fold.valid_x)?;
        Ok(self
            .evaluator
            .evaluate(&predictions.to_vec(), &fold.valid_y.to_vec()))
    }
}

struct Fold {
    train_x: Array2<f64>,
    train_y: Array1<f64>,
    valid_x: Array2<f64>,
    valid_y: Array1<f64>,
}
