//! End-to-end tests of the batch pipeline over a small synthetic tick file.
//!
//! Every test writes its CSV, models and plots into its own temp directory
//! and uses MockClock so artifact timestamps are deterministic.

use std::fmt::Write as _;
use std::path::Path;

use btc_forecast::{
    AppConfig, MockClock, ModelArtifact, ModelVariant, Pipeline, clean_and_enrich, read_ticks,
    pipeline::reference_frame,
};
use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

const HEADER: &str = "Timestamp,Open,High,Low,Close,Volume_(BTC),Volume_(Currency),Weighted_Price";

/// Synthetic minute ticks with a few incomplete rows mixed in
fn tick_csv(rows: usize) -> String {
    tick_csv_with(rows, |i| 4.0 + (i % 50) as f64 * 0.1 + i as f64 * 0.01)
}

fn tick_csv_with(rows: usize, open_at: impl Fn(usize) -> f64) -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for i in 0..rows {
        let ts = 1_325_317_920 + i as i64 * 60;
        if i % 25 == 7 {
            writeln!(csv, "{ts},NaN,NaN,NaN,NaN,NaN,NaN,NaN").unwrap();
            continue;
        }
        let open = open_at(i);
        let high = open + 0.2;
        let low = open - 0.2;
        let close = open + 0.05;
        let vol_btc = 0.5 + ((i * 7) % 11) as f64 * 0.3;
        let vol_cur = open * vol_btc;
        let weighted = open + 0.01 * (i % 3) as f64;
        writeln!(
            csv,
            "{ts},{open},{high},{low},{close},{vol_btc},{vol_cur},{weighted}"
        )
        .unwrap();
    }
    csv
}

fn setup(rows: usize, plots: bool) -> (TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ticks.csv");
    std::fs::write(&input, tick_csv(rows)).unwrap();

    let mut config = AppConfig::default();
    config.data.input_path = input;
    config.model.output_dir = dir.path().join("models");
    config.plots.output_dir = dir.path().join("plots");
    config.plots.enabled = plots;
    config.plots.max_points = 200;

    (dir, config)
}

fn clock() -> MockClock {
    MockClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap())
}

// ==================== Ingestion & Cleaning ====================

#[test]
fn test_reference_row_is_enriched() {
    let csv = format!("{HEADER}\n1325317920,4.39,4.39,4.39,4.39,0.45,1.98,4.39\n");
    let raw = read_ticks(csv.as_bytes()).unwrap();
    let (ticks, summary) = clean_and_enrich(&raw);

    assert_eq!(summary.rows_kept, 1);
    let tick = &ticks[0];
    assert_eq!(tick.vol_btc, 0.45);
    assert_eq!(tick.vol_currency, 1.98);
    assert_eq!(tick.date, NaiveDate::from_ymd_opt(2011, 12, 31).unwrap());
    assert_eq!(tick.year, "2011");
    assert_eq!(tick.day_of_week, 7);
}

#[test]
fn test_incomplete_rows_are_dropped() {
    let (_dir, config) = setup(100, false);
    let pipeline = Pipeline::with_clock(config, clock());

    let ticks = pipeline.load_data().unwrap();

    // rows 7, 32, 57, 82 are all-NaN
    assert_eq!(ticks.len(), 96);
}

#[test]
fn test_missing_input_file_fails() {
    let (dir, mut config) = setup(10, false);
    config.data.input_path = dir.path().join("missing.csv");
    let pipeline = Pipeline::with_clock(config, clock());

    let err = pipeline.load_data().unwrap_err();
    assert!(err.to_string().contains("Failed to ingest"));
}

// ==================== Full Run ====================

#[test]
fn test_full_run_scores_reference_rows() {
    let (_dir, config) = setup(400, false);
    let pipeline = Pipeline::with_clock(config, clock());

    let summary = pipeline.run().unwrap();

    assert_eq!(summary.predictions.len(), 2);
    assert!(summary.predictions.iter().all(|p| p.predicted_price.is_finite()));
    assert_eq!(summary.exploration.plots_written, 0);
}

#[test]
fn test_full_run_metrics_are_sane() {
    let (_dir, config) = setup(400, false);
    let pipeline = Pipeline::with_clock(config, clock());

    let summary = pipeline.run().unwrap();

    for report in summary.training.reports() {
        let train = report.training_summary();
        assert!(train.mae.is_finite() && train.mae >= 0.0);
        assert!(report.test_metric.is_finite() && report.test_metric >= 0.0);
    }
    let cv = summary.training.tuned.cv.as_ref().unwrap();
    assert_eq!(cv.best_params.max_iter, 50);
}

#[test]
fn test_run_persists_both_variants() {
    let (dir, config) = setup(300, false);
    let pipeline = Pipeline::with_clock(config, clock());
    pipeline.run().unwrap();

    for variant in ModelVariant::ALL {
        let artifact_dir = dir.path().join("models").join(variant.dir_name());
        assert!(artifact_dir.join("metadata.json").exists());
        assert!(artifact_dir.join("pipeline.bin").exists());

        let artifact = ModelArtifact::load(&artifact_dir).unwrap();
        assert_eq!(artifact.metadata.variant, variant);
        assert_eq!(
            artifact.metadata.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
        );
    }
}

#[test]
fn test_run_with_plots_writes_svg_files() {
    let (dir, config) = setup(300, true);
    let pipeline = Pipeline::with_clock(config, clock());

    let summary = pipeline.run().unwrap();

    let plots = dir.path().join("plots");
    if cfg!(feature = "plots") {
        assert_eq!(summary.exploration.plots_written, 10);
        assert!(plots.join("correlation_heatmap.svg").exists());
        assert!(plots.join("predictions_baseline.svg").exists());
        assert!(plots.join("predictions_tuned.svg").exists());
        assert!(plots.join("distribution_baseline.svg").exists());
        assert!(plots.join("distribution_tuned.svg").exists());
    } else {
        assert_eq!(summary.exploration.plots_written, 0);
    }
}

#[test]
fn test_constant_open_still_trains_and_persists() {
    let (dir, config) = setup(300, false);
    std::fs::write(&config.data.input_path, tick_csv_with(300, |_| 4.39)).unwrap();
    let pipeline = Pipeline::with_clock(config, clock());

    let summary = pipeline.run().unwrap();

    assert!(summary.predictions.iter().all(|p| p.predicted_price.is_finite()));
    for variant in ModelVariant::ALL {
        let artifact = ModelArtifact::load(&artifact_dir(dir.path(), variant)).unwrap();
        assert_eq!(artifact.pipeline.model.coefficients()[0], 0.0);
    }
}

// ==================== Inference ====================

#[test]
fn test_predict_reloads_selected_model() {
    let (_dir, config) = setup(300, false);
    let pipeline = Pipeline::with_clock(config, clock());
    let summary = pipeline.run().unwrap();

    let reloaded = pipeline.predict(&reference_frame().unwrap()).unwrap();

    assert_eq!(reloaded, summary.predictions);
}

#[test]
fn test_selected_variant_drives_inference() {
    let (_dir, mut config) = setup(300, false);
    config.model.selected = ModelVariant::Tuned;
    let pipeline = Pipeline::with_clock(config, clock());

    let summary = pipeline.run().unwrap();
    let tuned = summary
        .training
        .tuned
        .pipeline
        .predict(&reference_frame().unwrap())
        .unwrap();

    assert_eq!(summary.predictions, tuned);
}

#[test]
fn test_predict_without_artifact_fails() {
    let (_dir, config) = setup(10, false);
    let pipeline = Pipeline::with_clock(config, clock());

    let err = pipeline.predict(&reference_frame().unwrap()).unwrap_err();
    assert!(format!("{:#}", err).contains("not found"));
}

#[test]
fn test_retraining_overwrites_artifacts() {
    let (dir, config) = setup(300, false);
    let first = Pipeline::with_clock(config.clone(), clock());
    first.run().unwrap();

    let later = MockClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    let second = Pipeline::with_clock(config, later);
    second.run().unwrap();

    let artifact = ModelArtifact::load(&artifact_dir(dir.path(), ModelVariant::Baseline)).unwrap();
    assert_eq!(
        artifact.metadata.created_at,
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    );
}

fn artifact_dir(root: &Path, variant: ModelVariant) -> std::path::PathBuf {
    root.join("models").join(variant.dir_name())
}
