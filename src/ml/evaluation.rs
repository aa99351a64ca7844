//! Regression metrics and a metric-configurable evaluator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Metric computed by a [`RegressionEvaluator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegressionMetric {
    #[default]
    Rmse,
    Mse,
    Mae,
    R2,
}

impl RegressionMetric {
    /// Whether a higher value means a better model
    pub fn is_larger_better(&self) -> bool {
        matches!(self, RegressionMetric::R2)
    }
}

impl fmt::Display for RegressionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegressionMetric::Rmse => "rmse",
            RegressionMetric::Mse => "mse",
            RegressionMetric::Mae => "mae",
            RegressionMetric::R2 => "r2",
        };
        f.write_str(name)
    }
}

/// Compares predictions with true labels using one metric
#[derive(Debug, Clone, Copy, Default)]
pub struct RegressionEvaluator {
    metric: RegressionMetric,
}

impl RegressionEvaluator {
    pub fn new(metric: RegressionMetric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> RegressionMetric {
        self.metric
    }

    /// Evaluate; NaN when inputs are empty or of different lengths
    pub fn evaluate(&self, predictions: &[f64], labels: &[f64]) -> f64 {
        match self.metric {
            RegressionMetric::Rmse => rmse(predictions, labels),
            RegressionMetric::Mse => mse(predictions, labels),
            RegressionMetric::Mae => mae(predictions, labels),
            RegressionMetric::R2 => r2(predictions, labels),
        }
    }

    /// True when `candidate` beats `best` under this metric
    pub fn is_better(&self, candidate: f64, best: f64) -> bool {
        if self.metric.is_larger_better() {
            candidate > best
        } else {
            candidate < best
        }
    }
}

/// Summary of a model's fit on one data set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionSummary {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub n_samples: usize,
}

impl RegressionSummary {
    pub fn compute(predictions: &[f64], labels: &[f64]) -> Self {
        Self {
            mae: mae(predictions, labels),
            rmse: rmse(predictions, labels),
            r2: r2(predictions, labels),
            n_samples: labels.len(),
        }
    }
}

/// Mean squared error
pub fn mse(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return f64::NAN;
    }

    let sum_sq_error: f64 = predictions
        .iter()
        .zip(labels.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum();

    sum_sq_error / predictions.len() as f64
}

/// Root mean squared error
pub fn rmse(predictions: &[f64], labels: &[f64]) -> f64 {
    mse(predictions, labels).sqrt()
}

/// Mean absolute error
pub fn mae(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return f64::NAN;
    }

    let sum_abs_error: f64 = predictions
        .iter()
        .zip(labels.iter())
        .map(|(p, t)| (p - t).abs())
        .sum();

    sum_abs_error / predictions.len() as f64
}

/// Coefficient of determination
pub fn r2(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return f64::NAN;
    }

    let mean = labels.iter().sum::<f64>() / labels.len() as f64;
    let ss_tot: f64 = labels.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(labels.iter())
        .map(|(p, t)| (t - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { f64::NEG_INFINITY }
    } else {
        1.0 - ss_res / ss_tot
    }
}
