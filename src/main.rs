use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use btc_forecast::{Pipeline, config::AppConfig, pipeline::frame_from_rows};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "btc-forecast")]
#[command(about = "Bitcoin weighted-price exploration and regression pipeline")]
struct Args {
    /// Extra configuration file layered over the discovered ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Input CSV (overrides data.input_path)
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full pipeline: explore, train, persist, score the reference rows
    Run,
    /// Correlation matrix and descriptive plots only
    Explore,
    /// Train and persist both model variants
    Train,
    /// Score rows with the persisted selected model
    Predict {
        /// OPEN,VOLBTC,VOLCURRENCY (repeatable; defaults to the reference rows)
        #[arg(long = "row")]
        rows: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "btc_forecast=debug".to_string()),
        );

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config =
        AppConfig::load_with(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(input) = args.input {
        config.data.input_path = input;
    }

    tracing::info!("Starting {}", config.engine.app_name);
    let pipeline = Pipeline::new(config);

    match args.command {
        Command::Run => {
            let summary = pipeline.run()?;
            tracing::info!(
                "Run complete: {} rows, {} plots, {} predictions",
                summary.rows_kept,
                summary.exploration.plots_written,
                summary.predictions.len()
            );
        }
        Command::Explore => {
            let ticks = pipeline.load_data()?;
            pipeline.explore(&ticks);
        }
        Command::Train => {
            let ticks = pipeline.load_data()?;
            if ticks.is_empty() {
                bail!("No complete rows left after cleaning");
            }
            pipeline.train(&ticks)?;
        }
        Command::Predict { rows } => {
            let frame = frame_from_rows(&rows)?;
            pipeline.predict(&frame)?;
        }
    }

    Ok(())
}
