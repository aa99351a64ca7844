//! Exploratory outputs: correlation matrix and descriptive plots.
//!
//! This is a diagnostic side branch. Plot failures are logged and never
//! abort the pipeline.

#[cfg(feature = "plots")]
pub mod plots;

use std::fmt;

use crate::config::PlotsConfig;
use crate::enrich::{EnrichedTick, NUMERIC_COLUMNS};
use crate::frame::{Record, SchemaError, Value};

/// Pearson correlation of every pair of columns
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Correlate `columns` across `records`. A constant column correlates as NaN.
    pub fn compute<R: Record>(records: &[R], columns: &[&str]) -> Result<Self, SchemaError> {
        let k = columns.len();
        let n = records.len();

        let mut means = vec![0.0; k];
        for (row, record) in records.iter().enumerate() {
            for (i, column) in columns.iter().enumerate() {
                means[i] += numeric(record, column, row)?;
            }
        }
        if n > 0 {
            means.iter_mut().for_each(|m| *m /= n as f64);
        }

        // Upper triangle of the co-moment matrix, diagonal included
        let mut co_moments = vec![vec![0.0; k]; k];
        let mut centered = vec![0.0; k];
        for (row, record) in records.iter().enumerate() {
            for (i, column) in columns.iter().enumerate() {
                centered[i] = numeric(record, column, row)? - means[i];
            }
            for i in 0..k {
                for j in i..k {
                    co_moments[i][j] += centered[i] * centered[j];
                }
            }
        }

        let mut values = vec![vec![f64::NAN; k]; k];
        if n >= 2 {
            for i in 0..k {
                for j in i..k {
                    let denom = (co_moments[i][i] * co_moments[j][j]).sqrt();
                    let r = if denom > 0.0 {
                        (co_moments[i][j] / denom).clamp(-1.0, 1.0)
                    } else {
                        f64::NAN
                    };
                    values[i][j] = r;
                    values[j][i] = r;
                }
            }
        }

        Ok(Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values,
        })
    }

    /// Correlation matrix over every numeric column of the enriched ticks
    pub fn from_ticks(ticks: &[EnrichedTick]) -> Self {
        // Every NUMERIC_COLUMNS entry resolves to a number on an enriched tick
        Self::compute(ticks, &NUMERIC_COLUMNS).unwrap_or_else(|_| Self {
            columns: NUMERIC_COLUMNS.iter().map(|c| c.to_string()).collect(),
            values: vec![vec![f64::NAN; NUMERIC_COLUMNS.len()]; NUMERIC_COLUMNS.len()],
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Correlation between two named columns
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[i][j])
    }
}

impl fmt::Display for CorrelationMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>15}", "")?;
        for column in &self.columns {
            write!(f, "{:>15}", column)?;
        }
        writeln!(f)?;

        for (column, row) in self.columns.iter().zip(&self.values) {
            write!(f, "{:>15}", column)?;
            for value in row {
                write!(f, "{:>15.4}", value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn numeric<R: Record>(record: &R, column: &str, row: usize) -> Result<f64, SchemaError> {
    match record.value(column) {
        None => Err(SchemaError::MissingColumn(column.to_string())),
        Some(Value::Null) => Err(SchemaError::NullValue {
            column: column.to_string(),
            row,
        }),
        Some(value) => value.as_f64().ok_or_else(|| SchemaError::NonNumeric {
            column: column.to_string(),
            found: value.type_name(),
        }),
    }
}

/// Every `stride`-th item so that at most `max_points` are yielded
pub fn sample_stride<T>(items: &[T], max_points: usize) -> impl Iterator<Item = (usize, &T)> {
    let stride = if max_points == 0 {
        usize::MAX
    } else {
        items.len().div_ceil(max_points).max(1)
    };
    items.iter().enumerate().step_by(stride)
}

/// Print-ready outputs of the exploration stage
#[derive(Debug, Clone)]
pub struct Exploration {
    pub correlation: CorrelationMatrix,
    /// Number of plot files written
    pub plots_written: usize,
}

/// Compute the correlation matrix and, when enabled, render the
/// descriptive plots.
pub fn explore(ticks: &[EnrichedTick], config: &PlotsConfig) -> Exploration {
    let correlation = CorrelationMatrix::from_ticks(ticks);
    let plots_written = if config.enabled {
        render_exploration_plots(ticks, &correlation, config)
    } else {
        tracing::info!("Plot rendering disabled by configuration");
        0
    };

    Exploration {
        correlation,
        plots_written,
    }
}

#[cfg(feature = "plots")]
fn render_exploration_plots(
    ticks: &[EnrichedTick],
    correlation: &CorrelationMatrix,
    config: &PlotsConfig,
) -> usize {
    match plots::PlotRenderer::new(&config.output_dir, config.max_points) {
        Ok(renderer) => renderer.exploration_plots(ticks, correlation),
        Err(e) => {
            tracing::warn!("Skipping plots: {}", e);
            0
        }
    }
}

#[cfg(not(feature = "plots"))]
fn render_exploration_plots(
    _ticks: &[EnrichedTick],
    _correlation: &CorrelationMatrix,
    _config: &PlotsConfig,
) -> usize {
    tracing::info!("Plot rendering unavailable (built without the `plots` feature)");
    0
}

/// Plot actual vs predicted test prices for one model, as a line chart and
/// as overlaid distributions. Failures are logged; returns the files written.
pub fn plot_predictions(
    config: &PlotsConfig,
    name: &str,
    actual: &[f64],
    predicted: &[f64],
) -> usize {
    if !config.enabled {
        return 0;
    }

    #[cfg(feature = "plots")]
    {
        let renderer = match plots::PlotRenderer::new(&config.output_dir, config.max_points) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Failed to plot {} predictions: {}", name, e);
                return 0;
            }
        };

        [
            renderer.actual_vs_predicted(name, actual, predicted),
            renderer.prediction_distribution(name, actual, predicted),
        ]
        .into_iter()
        .filter(|rendered| match rendered {
            Ok(path) => {
                tracing::info!("Wrote {}", path.display());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to plot {} predictions: {}", name, e);
                false
            }
        })
        .count()
    }

    #[cfg(not(feature = "plots"))]
    {
        let _ = (name, actual, predicted);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use approx::assert_relative_eq;

    fn frame(rows: &[Vec<f64>]) -> Frame {
        Frame::from_f64_rows(["a", "b", "c"], rows).unwrap()
    }

    #[test]
    fn test_perfect_positive_and_negative_correlation() {
        let f = frame(&[
            vec![1.0, 2.0, 10.0],
            vec![2.0, 4.0, 8.0],
            vec![3.0, 6.0, 6.0],
            vec![4.0, 8.0, 4.0],
        ]);
        let rows: Vec<_> = f.rows().collect();
        let m = CorrelationMatrix::compute(&rows, &["a", "b", "c"]).unwrap();

        assert_relative_eq!(m.get("a", "b").unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(m.get("a", "c").unwrap(), -1.0, epsilon = 1e-12);
        assert_relative_eq!(m.get("c", "c").unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_is_symmetric() {
        let f = frame(&[
            vec![1.0, 5.0, 2.0],
            vec![2.0, 3.0, 9.0],
            vec![7.0, 1.0, 4.0],
            vec![3.0, 8.0, 1.0],
        ]);
        let rows: Vec<_> = f.rows().collect();
        let m = CorrelationMatrix::compute(&rows, &["a", "b", "c"]).unwrap();

        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.values()[i][j], m.values()[j][i]);
            }
        }
    }

    #[test]
    fn test_constant_column_is_nan() {
        let f = frame(&[vec![1.0, 3.0, 0.0], vec![2.0, 3.0, 1.0], vec![3.0, 3.0, 5.0]]);
        let rows: Vec<_> = f.rows().collect();
        let m = CorrelationMatrix::compute(&rows, &["a", "b", "c"]).unwrap();

        assert!(m.get("a", "b").unwrap().is_nan());
        assert!(m.get("b", "b").unwrap().is_nan());
        assert!(m.get("a", "c").unwrap().is_finite());
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let f = frame(&[vec![1.0, 2.0, 3.0]]);
        let rows: Vec<_> = f.rows().collect();

        assert_eq!(
            CorrelationMatrix::compute(&rows, &["a", "zzz"]),
            Err(SchemaError::MissingColumn("zzz".to_string()))
        );
    }

    #[test]
    fn test_display_has_header_and_rows() {
        let f = frame(&[vec![1.0, 2.0, 3.0], vec![2.0, 1.0, 5.0]]);
        let rows: Vec<_> = f.rows().collect();
        let m = CorrelationMatrix::compute(&rows, &["a", "b"]).unwrap();
        let table = m.to_string();

        assert_eq!(table.lines().count(), 3);
        assert!(table.lines().next().unwrap().contains('b'));
        assert!(table.contains("-1.0000"));
    }

    #[test]
    fn test_sample_stride_caps_points() {
        let items: Vec<usize> = (0..1000).collect();

        let sampled: Vec<_> = sample_stride(&items, 100).collect();
        assert_eq!(sampled.len(), 100);
        assert_eq!(sampled[1].0, 10);

        let all: Vec<_> = sample_stride(&items[..50], 100).collect();
        assert_eq!(all.len(), 50);
    }

    #[test]
    fn test_sample_stride_zero_yields_first_only() {
        let items = [1, 2, 3];
        assert_eq!(sample_stride(&items, 0).count(), 1);
    }

    #[test]
    fn test_explore_with_plots_disabled() {
        let config = PlotsConfig {
            enabled: false,
            ..PlotsConfig::default()
        };
        let result = explore(&[], &config);

        assert_eq!(result.plots_written, 0);
        assert_eq!(result.correlation.columns().len(), NUMERIC_COLUMNS.len());
    }

    #[test]
    fn test_prediction_plots_skipped_when_disabled() {
        let config = PlotsConfig {
            enabled: false,
            ..PlotsConfig::default()
        };
        assert_eq!(plot_predictions(&config, "baseline", &[1.0, 2.0], &[1.5, 2.5]), 0);
    }

    #[cfg(feature = "plots")]
    #[test]
    fn test_prediction_plots_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlotsConfig {
            enabled: true,
            output_dir: dir.path().to_path_buf(),
            ..PlotsConfig::default()
        };

        let written = plot_predictions(&config, "tuned", &[1.0, 2.0, 3.0], &[1.2, 2.1, 2.9]);

        assert_eq!(written, 2);
        assert!(dir.path().join("predictions_tuned.svg").exists());
        assert!(dir.path().join("distribution_tuned.svg").exists());
    }
}
