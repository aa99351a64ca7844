//! Minimal named-column access over row types.
//!
//! Stages that address data by column name (vector assembly, correlation)
//! work against the [`Record`] trait, so enriched ticks and ad-hoc inference
//! frames go through the same code path.

use chrono::NaiveDate;
use thiserror::Error;

/// A single typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    Null,
}

impl Value {
    /// Numeric view of the cell; `None` for strings, dates and nulls
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Null => "null",
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

/// Row addressable by column name
pub trait Record {
    /// Cell value for `column`, or `None` when the row has no such column
    fn value(&self, column: &str) -> Option<Value>;
}

impl<T: Record + ?Sized> Record for &T {
    fn value(&self, column: &str) -> Option<Value> {
        (**self).value(column)
    }
}

/// Errors raised when a table does not have the expected shape
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Column '{0}' not found")]
    MissingColumn(String),
    #[error("Column '{column}' is not numeric (found {found})")]
    NonNumeric { column: String, found: &'static str },
    #[error("Null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },
    #[error("Row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),
}

/// Small in-memory table built programmatically, e.g. for inference input.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Build a frame, checking that every row matches the column count
    pub fn new<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, SchemaError> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();

        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(SchemaError::DuplicateColumn(name.clone()));
            }
        }

        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(SchemaError::RaggedRow {
                    row,
                    expected: columns.len(),
                    found: cells.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    /// Frame of purely numeric rows
    pub fn from_f64_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: &[Vec<f64>],
    ) -> Result<Self, SchemaError> {
        let rows = rows
            .iter()
            .map(|r| r.iter().copied().map(Value::Float).collect())
            .collect();
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = FrameRow<'_>> {
        self.rows.iter().map(move |cells| FrameRow {
            columns: &self.columns,
            cells,
        })
    }
}

/// Borrowed view of one frame row
#[derive(Debug, Clone, Copy)]
pub struct FrameRow<'a> {
    columns: &'a [String],
    cells: &'a [Value],
}

impl Record for FrameRow<'_> {
    fn value(&self, column: &str) -> Option<Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.cells[i].clone())
    }
}
