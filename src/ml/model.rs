//! Linear regression models backed by linfa.
//!
//! Unregularized fits use the closed-form least squares solver from
//! `linfa-linear`, falling back to coordinate descent when the normal
//! equations are singular. Any positive `reg_param` switches to elastic-net
//! coordinate descent from `linfa-elasticnet`. That path fits `y / sd(y)`
//! with penalty `reg / sd(y)`, which in label units minimizes
//! `1/(2n) ||y - Xw||^2 + reg * l1 * ||w||_1 + reg * (1 - l1) / (2 sd(y)) * ||w||^2`.

use linfa::prelude::*;
use linfa_elasticnet::ElasticNet;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::evaluation::RegressionSummary;

/// Hyperparameters of a linear regression fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparams {
    /// Iteration cap for the iterative solver (inert for closed-form fits)
    pub max_iter: u32,
    /// Overall regularization strength
    pub reg_param: f64,
    /// L1 share of the penalty: 0 = ridge, 1 = lasso
    pub elastic_net_param: f64,
    /// Scale features to unit variance before fitting
    pub standardization: bool,
    pub fit_intercept: bool,
    pub tolerance: f64,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            max_iter: 100,
            reg_param: 0.0,
            elastic_net_param: 0.0,
            standardization: true,
            fit_intercept: true,
            tolerance: 1e-6,
        }
    }
}

impl Hyperparams {
    /// Fixed settings of the baseline model
    pub fn baseline() -> Self {
        Self {
            max_iter: 100,
            reg_param: 0.3,
            elastic_net_param: 0.8,
            standardization: false,
            ..Self::default()
        }
    }

    pub fn with_max_iter(mut self, max_iter: u32) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Solver these settings dispatch to
    pub fn solver(&self) -> Solver {
        if self.reg_param == 0.0 {
            Solver::LeastSquares
        } else {
            Solver::CoordinateDescent
        }
    }

    fn validate(&self) -> Result<(), TrainingError> {
        if !(self.reg_param >= 0.0) {
            return Err(TrainingError::InvalidHyperparams(format!(
                "reg_param must be >= 0, got {}",
                self.reg_param
            )));
        }
        if !(0.0..=1.0).contains(&self.elastic_net_param) {
            return Err(TrainingError::InvalidHyperparams(format!(
                "elastic_net_param must be in [0, 1], got {}",
                self.elastic_net_param
            )));
        }
        if self.max_iter == 0 {
            return Err(TrainingError::InvalidHyperparams(
                "max_iter must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Solver {
    LeastSquares,
    CoordinateDescent,
}

/// A fitted linear model: `y = x . weights + intercept`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    weights: Vec<f64>,
    intercept: f64,
    hyperparams: Hyperparams,
    solver: Solver,
    /// Fit quality on the training data
    pub training_summary: RegressionSummary,
}

impl LinearModel {
    pub fn coefficients(&self) -> &[f64] {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn hyperparams(&self) -> &Hyperparams {
        &self.hyperparams
    }

    pub fn solver(&self) -> Solver {
        self.solver
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    /// Predict for each row of `x`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        if x.ncols() != self.n_features() {
            return Err(TrainingError::FeatureCountMismatch {
                expected: self.n_features(),
                found: x.ncols(),
            });
        }

        let weights = Array1::from_vec(self.weights.clone());
        Ok(x.dot(&weights) + self.intercept)
    }

    /// Get model information as a string
    pub fn info(&self) -> String {
        format!(
            "LinearModel(solver={:?}, max_iter={}, reg={}, l1={}, coef={:?}, intercept={:.4}, train_mae={:.4})",
            self.solver,
            self.hyperparams.max_iter,
            self.hyperparams.reg_param,
            self.hyperparams.elastic_net_param,
            self.weights,
            self.intercept,
            self.training_summary.mae
        )
    }
}

/// Fits linear models with a fixed set of hyperparameters
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelBuilder {
    hyperparams: Hyperparams,
}

impl ModelBuilder {
    pub fn new(hyperparams: Hyperparams) -> Self {
        Self { hyperparams }
    }

    pub fn hyperparams(&self) -> &Hyperparams {
        &self.hyperparams
    }

    /// Train a model on the provided data
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<LinearModel, TrainingError> {
        if x.nrows() == 0 || y.is_empty() {
            return Err(TrainingError::InsufficientData(0));
        }

        if x.nrows() != y.len() {
            return Err(TrainingError::MismatchedLengths {
                features: x.nrows(),
                targets: y.len(),
            });
        }

        let hp = self.hyperparams;
        hp.validate()?;

        // Constant columns carry no signal once an intercept is fitted and make
        // the normal equations singular, so they keep a zero coefficient.
        let active: Vec<usize> = (0..x.ncols())
            .filter(|&j| is_informative(x.column(j), hp.fit_intercept))
            .collect();
        if active.len() < x.ncols() {
            tracing::debug!(
                "Fitting {} of {} feature columns, the rest are constant",
                active.len(),
                x.ncols()
            );
        }

        let y_mean = y.mean().unwrap_or(0.0);
        let constant_label = hp.fit_intercept && y.iter().all(|v| *v == y[0]);

        let (weights, intercept, solver) = if active.is_empty() || constant_label {
            let intercept = if hp.fit_intercept { y_mean } else { 0.0 };
            (Array1::zeros(x.ncols()), intercept, hp.solver())
        } else {
            let x_active = x.select(Axis(1), &active);
            let (active_weights, intercept, solver) = fit_active(&hp, &x_active, y)?;

            let mut weights = Array1::zeros(x.ncols());
            for (&j, w) in active.iter().zip(active_weights.iter()) {
                weights[j] = *w;
            }
            (weights, intercept, solver)
        };

        if weights.iter().any(|w| !w.is_finite()) || !intercept.is_finite() {
            return Err(TrainingError::FitError(
                "solver produced non-finite coefficients".to_string(),
            ));
        }

        let predictions = x.dot(&weights) + intercept;
        let training_summary = RegressionSummary::compute(&predictions.to_vec(), &y.to_vec());

        Ok(LinearModel {
            weights: weights.to_vec(),
            intercept,
            hyperparams: hp,
            solver,
            training_summary,
        })
    }
}

/// Fit on columns that all vary. Returns weights in the original feature
/// units and the solver that produced them.
fn fit_active(
    hp: &Hyperparams,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<(Array1<f64>, f64, Solver), TrainingError> {
    let scale = if hp.standardization {
        column_std(x)
    } else {
        Array1::ones(x.ncols())
    };
    let x_fit = x / &scale;

    match hp.solver() {
        Solver::LeastSquares => {
            let dataset = Dataset::new(x_fit.clone(), y.clone());
            let fitted: Result<_, linfa_linear::LinearError<f64>> = LinearRegression::default()
                .with_intercept(hp.fit_intercept)
                .fit(&dataset);
            let failure = match fitted {
                Ok(fitted) if fitted.params().iter().all(|w| w.is_finite()) => {
                    return Ok((
                        fitted.params() / &scale,
                        fitted.intercept(),
                        Solver::LeastSquares,
                    ));
                }
                Ok(_) => "non-finite coefficients".to_string(),
                Err(e) => e.to_string(),
            };
            tracing::warn!(
                "Least squares failed ({}), falling back to coordinate descent",
                failure
            );
            let (weights, intercept) = coordinate_descent(hp, x_fit, y)?;
            Ok((weights / &scale, intercept, Solver::CoordinateDescent))
        }
        Solver::CoordinateDescent => {
            let (weights, intercept) = coordinate_descent(hp, x_fit, y)?;
            Ok((weights / &scale, intercept, Solver::CoordinateDescent))
        }
    }
}

/// Elastic net on labels divided by their standard deviation, with the
/// penalty divided by the same factor; coefficients are mapped back to
/// label units afterwards.
fn coordinate_descent(
    hp: &Hyperparams,
    x: Array2<f64>,
    y: &Array1<f64>,
) -> Result<(Array1<f64>, f64), TrainingError> {
    let y_std = label_std(y);
    let dataset = Dataset::new(x, y / y_std);

    let fitted = ElasticNet::params()
        .penalty(hp.reg_param / y_std)
        .l1_ratio(hp.elastic_net_param)
        .max_iterations(hp.max_iter)
        .tolerance(hp.tolerance)
        .with_intercept(hp.fit_intercept)
        .fit(&dataset)
        .map_err(|e| TrainingError::FitError(e.to_string()))?;

    Ok((fitted.hyperplane() * y_std, fitted.intercept() * y_std))
}

fn is_informative(column: ndarray::ArrayView1<f64>, fit_intercept: bool) -> bool {
    let Some(first) = column.get(0).copied() else {
        return false;
    };
    let varies = column.iter().any(|v| *v != first);
    // Without an intercept a constant non-zero column still shifts predictions
    varies || (!fit_intercept && column.iter().any(|v| *v != 0.0))
}

fn label_std(y: &Array1<f64>) -> f64 {
    if y.len() < 2 {
        return 1.0;
    }
    let s = y.std_axis(Axis(0), 1.0).into_scalar();
    if s > 0.0 && s.is_finite() { s } else { 1.0 }
}

/// Sample standard deviation per column; 1.0 where it is zero or undefined
fn column_std(x: &Array2<f64>) -> Array1<f64> {
    if x.nrows() < 2 {
        return Array1::ones(x.ncols());
    }
    x.std_axis(Axis(0), 1.0)
        .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 })
}

/// Errors that can occur during model training
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainingError {
    #[error("Insufficient data for training: {0} samples")]
    InsufficientData(usize),
    #[error("Feature and target lengths mismatch: {features} vs {targets}")]
    MismatchedLengths { features: usize, targets: usize },
    #[error("Expected {expected} features, got {found}")]
    FeatureCountMismatch { expected: usize, found: usize },
    #[error("Training data has no labels")]
    MissingLabels,
    #[error("Invalid hyperparameters: {0}")]
    InvalidHyperparams(String),
    #[error("Model fitting error: {0}")]
    FitError(String),
    #[error("Parameter grid is empty")]
    EmptyGrid,
    #[error("Cross-validation needs at least 2 folds, got {0}")]
    InvalidFolds(usize),
    #[error("Failed to start cross-validation workers: {0}")]
    ThreadPool(String),
}
