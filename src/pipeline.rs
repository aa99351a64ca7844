//! Stage orchestration: ingest, clean, explore, train, persist, predict.

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};

use crate::config::AppConfig;
use crate::enrich::{EnrichedTick, clean_and_enrich};
use crate::explore::{self, Exploration};
use crate::frame::Frame;
use crate::ingest::load_ticks;
use crate::ml::features::FEATURE_COLUMNS;
use crate::ml::training::{self, TrainingOptions, TrainingResult};
use crate::ml::{FittedPipeline, ModelArtifact, ModelVariant, PredictionRow};
use crate::traits::{Clock, SystemClock};

/// Inference rows scored at the end of a full run when no others are given
pub const REFERENCE_ROWS: [[f64; 3]; 2] = [
    [20546.29, 3422.57, 72403082.02],
    [21620.85, 3271.14, 71319207.5],
];

/// Test rows echoed next to their predictions after training
pub const TEST_PREVIEW_ROWS: usize = 10;

/// Everything a full run produced
#[derive(Debug)]
pub struct RunSummary {
    pub rows_kept: usize,
    pub exploration: Exploration,
    pub training: TrainingResult,
    pub predictions: Vec<PredictionRow>,
}

/// The batch pipeline bound to one configuration
pub struct Pipeline<C: Clock = SystemClock> {
    config: AppConfig,
    clock: C,
}

impl Pipeline<SystemClock> {
    pub fn new(config: AppConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Pipeline<C> {
    pub fn with_clock(config: AppConfig, clock: C) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Ingest the configured CSV and clean it
    pub fn load_data(&self) -> Result<Vec<EnrichedTick>> {
        let path = &self.config.data.input_path;
        let raw = load_ticks(path)
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        let (ticks, _) = clean_and_enrich(&raw);
        Ok(ticks)
    }

    /// Print the correlation matrix and render the descriptive plots
    pub fn explore(&self, ticks: &[EnrichedTick]) -> Exploration {
        let exploration = explore::explore(ticks, &self.config.plots);
        println!("Correlation matrix ({} rows):", ticks.len());
        println!("{}", exploration.correlation);
        exploration
    }

    /// Fit both variants, report their metrics and persist them
    pub fn train(&self, ticks: &[EnrichedTick]) -> Result<TrainingResult> {
        let options = TrainingOptions::from(&self.config);
        let prepared =
            training::prepare(ticks, &options).context("Failed to prepare features")?;
        let result =
            training::train_models(&prepared, &options).context("Failed to train models")?;

        print!("{}", format_metrics(&result, self.config.model.selected));

        for report in result.reports() {
            let dir = self.config.model.artifact_dir(report.variant);
            report
                .to_artifact(&self.clock)
                .save(&dir)
                .with_context(|| format!("Failed to save {} model", report.variant))?;

            print!(
                "{}",
                format_test_preview(
                    report.variant,
                    prepared.test_labels(),
                    &report.test_predictions,
                    TEST_PREVIEW_ROWS
                )
            );
            explore::plot_predictions(
                &self.config.plots,
                report.variant.dir_name(),
                prepared.test_labels(),
                &report.test_predictions,
            );
        }

        Ok(result)
    }

    /// Load the configured variant from disk
    pub fn load_selected(&self) -> Result<ModelArtifact> {
        let variant = self.config.model.selected;
        let dir = self.config.model.artifact_dir(variant);
        let artifact = ModelArtifact::load(&dir).with_context(|| {
            format!(
                "Failed to load {} model from {} (run `train` first)",
                variant,
                dir.display()
            )
        })?;
        tracing::info!("Using {}", artifact.metadata.summary());
        Ok(artifact)
    }

    /// Score rows with the persisted selected model
    pub fn predict(&self, frame: &Frame) -> Result<Vec<PredictionRow>> {
        let artifact = self.load_selected()?;
        score(&artifact.pipeline, frame)
    }

    /// All stages in order, ending with the reference inference rows
    pub fn run(&self) -> Result<RunSummary> {
        let span = tracing::info_span!("pipeline", app = %self.config.engine.app_name);
        let _guard = span.enter();

        let ticks = self.load_data()?;
        if ticks.is_empty() {
            bail!("No complete rows left after cleaning");
        }

        let exploration = self.explore(&ticks);
        let training = self.train(&ticks)?;

        let selected = &training.report(self.config.model.selected).pipeline;
        let predictions = score(selected, &reference_frame()?)?;

        Ok(RunSummary {
            rows_kept: ticks.len(),
            exploration,
            training,
            predictions,
        })
    }
}

fn score(pipeline: &FittedPipeline, frame: &Frame) -> Result<Vec<PredictionRow>> {
    let predictions = pipeline.predict(frame).context("Inference failed")?;
    print!("{}", format_predictions(&predictions));
    Ok(predictions)
}

/// Frame holding [`REFERENCE_ROWS`]
pub fn reference_frame() -> Result<Frame> {
    let rows: Vec<Vec<f64>> = REFERENCE_ROWS.iter().map(|r| r.to_vec()).collect();
    Ok(Frame::from_f64_rows(FEATURE_COLUMNS, &rows)?)
}

/// Parse `OPEN,VOLBTC,VOLCURRENCY`
pub fn parse_feature_row(s: &str) -> Result<Vec<f64>> {
    let values = s
        .split(',')
        .map(|v| {
            let v = v.trim();
            let value = v
                .parse::<f64>()
                .with_context(|| format!("Invalid number '{}' in row '{}'", v, s))?;
            if !value.is_finite() {
                bail!("Non-finite value '{}' in row '{}'", v, s);
            }
            Ok(value)
        })
        .collect::<Result<Vec<f64>>>()?;

    if values.len() != FEATURE_COLUMNS.len() {
        bail!(
            "Expected {} values ({}), got {} in '{}'",
            FEATURE_COLUMNS.len(),
            FEATURE_COLUMNS.join(","),
            values.len(),
            s
        );
    }
    Ok(values)
}

/// Frame from rows given on the command line; the reference rows when empty
pub fn frame_from_rows(rows: &[String]) -> Result<Frame> {
    if rows.is_empty() {
        return reference_frame();
    }
    let parsed = rows
        .iter()
        .map(|r| parse_feature_row(r))
        .collect::<Result<Vec<_>>>()?;
    Ok(Frame::from_f64_rows(FEATURE_COLUMNS, &parsed)?)
}

/// Per-variant metric lines plus the selected variant
pub fn format_metrics(result: &TrainingResult, selected: ModelVariant) -> String {
    let mut out = String::new();
    for report in result.reports() {
        let train = report.training_summary();
        let _ = write!(
            out,
            "{:<9} train MAE = {:.4}  test {} = {:.4}",
            report.variant.to_string(),
            train.mae,
            report.metric.to_string().to_uppercase(),
            report.test_metric
        );
        if let Some(test) = report.test_summary {
            let _ = write!(out, "  test MAE = {:.4}", test.mae);
        }
        if let Some(cv) = &report.cv {
            let scores: Vec<String> = cv
                .scores
                .iter()
                .map(|(p, m)| format!("maxIter={} -> {:.4}", p.max_iter, m))
                .collect();
            let _ = write!(
                out,
                "  (cv {}: {}; best maxIter={})",
                cv.metric,
                scores.join(", "),
                cv.best_params.max_iter
            );
        }
        out.push('\n');
    }
    let _ = writeln!(out, "Selected model for inference: {}", selected);
    out
}

/// First `limit` test labels next to one model's predictions
pub fn format_test_preview(
    variant: ModelVariant,
    actual: &[f64],
    predicted: &[f64],
    limit: usize,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} model, first test rows:", variant);
    let _ = writeln!(out, "{:>18} {:>18}", "Weighted_Price", "prediction");
    for (a, p) in actual.iter().zip(predicted).take(limit) {
        let _ = writeln!(out, "{:>18.4} {:>18.4}", a, p);
    }
    out
}

/// Table of scaled features and predicted prices
pub fn format_predictions(rows: &[PredictionRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<48} {:>18}", "scaled_features", "Predicted_price");
    for row in rows {
        let features: Vec<String> = row.scaled_features.iter().map(|v| format!("{:.6}", v)).collect();
        let _ = writeln!(
            out,
            "{:<48} {:>18.4}",
            format!("[{}]", features.join(", ")),
            row.predicted_price
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature_row() {
        assert_eq!(
            parse_feature_row("20546.29, 3422.57,72403082.02").unwrap(),
            vec![20546.29, 3422.57, 72403082.02]
        );
    }

    #[test]
    fn test_parse_feature_row_rejects_wrong_arity() {
        assert!(parse_feature_row("1.0,2.0").is_err());
        assert!(parse_feature_row("1.0,2.0,3.0,4.0").is_err());
    }

    #[test]
    fn test_parse_feature_row_rejects_garbage() {
        let err = parse_feature_row("1.0,abc,3.0").unwrap_err();
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_parse_feature_row_rejects_non_finite() {
        for row in ["NaN,1,2", "1,inf,2", "1,2,-infinity"] {
            let err = parse_feature_row(row).unwrap_err();
            assert!(err.to_string().contains("Non-finite"), "{row}: {err}");
        }
        assert!(frame_from_rows(&["NaN,1,2".to_string()]).is_err());
    }

    #[test]
    fn test_frame_from_no_rows_is_reference() {
        let frame = frame_from_rows(&[]).unwrap();
        assert_eq!(frame, reference_frame().unwrap());
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_frame_from_rows() {
        let frame = frame_from_rows(&["1,2,3".to_string(), "4,5,6".to_string()]).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.columns(), &["Open", "VolBTC", "VolCurrency"]);
    }

    #[test]
    fn test_format_test_preview_is_capped() {
        let actual: Vec<f64> = (0..25).map(f64::from).collect();
        let predicted: Vec<f64> = actual.iter().map(|v| v + 0.5).collect();

        let table = format_test_preview(ModelVariant::Tuned, &actual, &predicted, TEST_PREVIEW_ROWS);

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2 + TEST_PREVIEW_ROWS);
        assert!(lines[0].starts_with("tuned model"));
        assert!(lines[2].ends_with("0.5000"));
        assert!(format_test_preview(ModelVariant::Baseline, &[1.0], &[2.0], 10).lines().count() == 3);
    }

    #[test]
    fn test_format_predictions() {
        let table = format_predictions(&[PredictionRow {
            scaled_features: vec![0.5, 0.25, 1.0],
            predicted_price: 20500.125,
        }]);

        assert!(table.starts_with("scaled_features"));
        assert!(table.contains("[0.500000, 0.250000, 1.000000]"));
        assert!(table.contains("20500.1250"));
    }
}
