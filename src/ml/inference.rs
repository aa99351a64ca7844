//! Applying a frozen pipeline to new rows.

use serde::Serialize;

use crate::frame::{Frame, Record};

use super::features::FeatureMatrix;
use super::{FittedPipeline, MlError};

/// One scored input row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub scaled_features: Vec<f64>,
    pub predicted_price: f64,
}

impl FittedPipeline {
    /// Assemble, scale and score each record. Labels are not required.
    pub fn predict_records<R, I>(&self, records: I) -> Result<Vec<PredictionRow>, MlError>
    where
        R: Record,
        I: IntoIterator<Item = R>,
    {
        let assembled = self.assembler.without_label().transform(records)?;
        self.predict_matrix(&assembled)
    }

    /// Score every row of `frame`
    pub fn predict(&self, frame: &Frame) -> Result<Vec<PredictionRow>, MlError> {
        let predictions = self.predict_records(frame.rows())?;
        tracing::debug!("Scored {} inference rows", predictions.len());
        Ok(predictions)
    }

    /// Score an already assembled (unscaled) matrix with the frozen scaler
    pub fn predict_matrix(&self, assembled: &FeatureMatrix) -> Result<Vec<PredictionRow>, MlError> {
        let scaled = self.scaler.scale(&assembled.features)?;
        let predictions = self.model.predict(&scaled)?;

        Ok(scaled
            .rows()
            .into_iter()
            .zip(predictions.iter())
            .map(|(row, &price)| PredictionRow {
                scaled_features: row.to_vec(),
                predicted_price: price,
            })
            .collect())
    }
}
