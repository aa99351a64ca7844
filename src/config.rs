use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::ml::ModelVariant;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub data: DataConfig,
    pub split: SplitConfig,
    pub training: TrainingConfig,
    pub model: ModelConfig,
    pub plots: PlotsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Name attached to the root tracing span of a pipeline run
    pub app_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "btc-forecast".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub input_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data/dataset.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SplitConfig {
    pub seed: u64,
    pub train_ratio: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            seed: 23,
            train_ratio: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    pub cv_folds: usize,
    pub cv_parallelism: usize,
    pub max_iter_grid: Vec<u32>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cv_folds: 3,
            cv_parallelism: 2,
            max_iter_grid: vec![50, 100],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub output_dir: PathBuf,
    /// Variant used for inference. Chosen by the operator, never derived from metrics.
    pub selected: ModelVariant,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("models"),
            selected: ModelVariant::Baseline,
        }
    }
}

impl ModelConfig {
    /// Directory holding the artifact of the given variant
    pub fn artifact_dir(&self, variant: ModelVariant) -> PathBuf {
        self.output_dir.join(variant.dir_name())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlotsConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    /// Upper bound on points drawn per chart; larger series are stride-sampled
    pub max_points: usize,
}

impl Default for PlotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("plots"),
            max_points: 20_000,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, optionally layering an explicit file on top of the
    /// discovered ones.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("btc-forecast");

        let mut builder = Config::builder()
            // 1. Load default values
            // Engine
            .set_default("engine.app_name", "btc-forecast")?
            // Data
            .set_default("data.input_path", "data/dataset.csv")?
            // Split
            .set_default("split.seed", 23)?
            .set_default("split.train_ratio", 0.7)?
            // Training
            .set_default("training.cv_folds", 3)?
            .set_default("training.cv_parallelism", 2)?
            .set_default("training.max_iter_grid", vec![50, 100])?
            // Model
            .set_default("model.output_dir", "models")?
            .set_default("model.selected", "baseline")?
            // Plots
            .set_default("plots.enabled", true)?
            .set_default("plots.output_dir", "plots")?
            .set_default("plots.max_points", 20_000)?

            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false));

        // 4. Explicit file given on the command line (must exist)
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // 5. Environment variables (BTC_FORECAST__DATA__INPUT_PATH=...)
        let builder = builder.add_source(
            Environment::with_prefix("BTC_FORECAST")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("training.max_iter_grid")
                .try_parsing(true),
        );

        let s = builder.build().context("Failed to build configuration")?;
        let config: Self = s
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.split.train_ratio > 0.0 && self.split.train_ratio < 1.0) {
            anyhow::bail!(
                "split.train_ratio must be in (0, 1), got {}",
                self.split.train_ratio
            );
        }
        if self.training.cv_folds < 2 {
            anyhow::bail!("training.cv_folds must be at least 2");
        }
        if self.training.cv_parallelism == 0 {
            anyhow::bail!("training.cv_parallelism must be at least 1");
        }
        if self.training.max_iter_grid.is_empty() {
            anyhow::bail!("training.max_iter_grid must not be empty");
        }
        Ok(())
    }
}
