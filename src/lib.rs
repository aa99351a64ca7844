//! BTC Forecast Library
//!
//! Batch pipeline over minute-level Bitcoin market data: ingestion and
//! cleaning, exploratory statistics and plots, and a linear regression of the
//! weighted price with persisted models for inference.

pub mod config;
pub mod enrich;
pub mod explore;
pub mod frame;
pub mod ingest;
pub mod ml;
pub mod pipeline;
pub mod traits;

// Re-export commonly used types
pub use config::AppConfig;
pub use enrich::{CleaningSummary, EnrichedTick, clean_and_enrich};
pub use explore::{CorrelationMatrix, Exploration};
pub use frame::{Frame, Record, SchemaError, Value};
pub use ingest::{IngestError, RawTick, load_ticks, read_ticks};
pub use ml::{FittedPipeline, MlError, ModelArtifact, ModelVariant, PredictionRow};
pub use pipeline::{Pipeline, RunSummary};
pub use traits::{Clock, MockClock, SystemClock};
