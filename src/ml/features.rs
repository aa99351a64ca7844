//! Vector assembly: named numeric columns into a dense feature matrix.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::frame::{Record, SchemaError, Value};

/// Feature columns in the order the model consumes them
pub const FEATURE_COLUMNS: [&str; 3] = ["Open", "VolBTC", "VolCurrency"];

/// Regression target
pub const LABEL_COLUMN: &str = "Weighted_Price";

/// Assembled feature vectors, their scaled counterpart once a scaler has
/// been applied, and the labels when the source had them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub features: Array2<f64>,
    pub scaled: Option<Array2<f64>>,
    pub labels: Option<Array1<f64>>,
}

impl FeatureMatrix {
    pub fn new(features: Array2<f64>, labels: Option<Array1<f64>>) -> Self {
        Self {
            features,
            scaled: None,
            labels,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// Scaled features if present, raw features otherwise
    pub fn model_input(&self) -> &Array2<f64> {
        self.scaled.as_ref().unwrap_or(&self.features)
    }

    /// Raw feature vector of one row
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.row(index)
    }

    /// Rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            scaled: self.scaled.as_ref().map(|s| s.select(Axis(0), indices)),
            labels: self.labels.as_ref().map(|l| l.select(Axis(0), indices)),
        }
    }
}

/// Frozen list of input columns (and optional label) to assemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorAssembler {
    input_columns: Vec<String>,
    label_column: Option<String>,
}

impl Default for VectorAssembler {
    fn default() -> Self {
        Self::new(FEATURE_COLUMNS)
    }
}

impl VectorAssembler {
    pub fn new<S: Into<String>>(input_columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            input_columns: input_columns.into_iter().map(Into::into).collect(),
            label_column: None,
        }
    }

    /// Also extract a label column
    pub fn with_label(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    /// Same inputs, no label (for inference on unlabeled data)
    pub fn without_label(&self) -> Self {
        Self {
            input_columns: self.input_columns.clone(),
            label_column: None,
        }
    }

    pub fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    pub fn label_column(&self) -> Option<&str> {
        self.label_column.as_deref()
    }

    /// Assemble feature vectors (and labels) from records.
    pub fn transform<R, I>(&self, records: I) -> Result<FeatureMatrix, SchemaError>
    where
        R: Record,
        I: IntoIterator<Item = R>,
    {
        let n_features = self.input_columns.len();
        let mut flat = Vec::new();
        let mut labels = self.label_column.as_ref().map(|_| Vec::new());
        let mut n_rows = 0;

        for (row, record) in records.into_iter().enumerate() {
            for column in &self.input_columns {
                flat.push(numeric(&record, column, row)?);
            }
            if let (Some(column), Some(labels)) = (&self.label_column, labels.as_mut()) {
                labels.push(numeric(&record, column, row)?);
            }
            n_rows += 1;
        }

        // Shape always matches the number of pushed values
        let features = Array2::from_shape_vec((n_rows, n_features), flat)
            .unwrap_or_else(|_| Array2::zeros((0, n_features)));

        Ok(FeatureMatrix::new(features, labels.map(Array1::from_vec)))
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
