//! CSV ingestion of raw exchange ticks.
//!
//! Empty cells and `NaN` literals are read as nulls; the cleaning stage drops
//! those rows. Anything else that fails to parse is a format error.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use thiserror::Error;

/// Header columns of the tick file, in the canonical order.
pub const RAW_COLUMNS: [&str; 8] = [
    "Timestamp",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume_(BTC)",
    "Volume_(Currency)",
    "Weighted_Price",
];

/// One row of the tick file. Every field is nullable at this stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTick {
    pub timestamp: Option<i64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume_btc: Option<f64>,
    pub volume_currency: Option<f64>,
    pub weighted_price: Option<f64>,
}

impl RawTick {
    /// True when any field is null
    pub fn has_null(&self) -> bool {
        self.timestamp.is_none()
            || self.open.is_none()
            || self.high.is_none()
            || self.low.is_none()
            || self.close.is_none()
            || self.volume_btc.is_none()
            || self.volume_currency.is_none()
            || self.weighted_price.is_none()
    }
}

/// Errors raised while reading the tick file
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Missing expected column '{0}' in header")]
    MissingColumn(String),
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid value '{value}' for column '{column}' on line {line}")]
    InvalidValue {
        line: u64,
        column: &'static str,
        value: String,
    },
}

/// Position of each expected column in the file's header
#[derive(Debug, Clone, Copy)]
struct ColumnIndex([usize; 8]);

impl ColumnIndex {
    fn from_header(header: &StringRecord) -> Result<Self, IngestError> {
        let mut positions = [0usize; 8];
        for (slot, name) in positions.iter_mut().zip(RAW_COLUMNS) {
            *slot = header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| IngestError::MissingColumn(name.to_string()))?;
        }
        Ok(Self(positions))
    }
}

/// Load ticks from a CSV file on disk
pub fn load_ticks(path: &Path) -> Result<Vec<RawTick>, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let ticks = read_ticks(file)?;
    tracing::info!("Read {} rows from {}", ticks.len(), path.display());
    Ok(ticks)
}

/// Read ticks from any CSV source with a header row
pub fn read_ticks<R: Read>(reader: R) -> Result<Vec<RawTick>, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let index = ColumnIndex::from_header(rdr.headers()?)?;

    let mut ticks = Vec::new();
    let mut record = StringRecord::new();
    while rdr.read_record(&mut record)? {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        ticks.push(parse_record(&record, &index, line)?);
    }

    Ok(ticks)
}

fn parse_record(record: &StringRecord, index: &ColumnIndex, line: u64) -> Result<RawTick, IngestError> {
    let [ts, open, high, low, close, vol_btc, vol_cur, weighted] = index.0;

    Ok(RawTick {
        timestamp: parse_timestamp(record.get(ts), line)?,
        open: parse_float(record.get(open), RAW_COLUMNS[1], line)?,
        high: parse_float(record.get(high), RAW_COLUMNS[2], line)?,
        low: parse_float(record.get(low), RAW_COLUMNS[3], line)?,
        close: parse_float(record.get(close), RAW_COLUMNS[4], line)?,
        volume_btc: parse_float(record.get(vol_btc), RAW_COLUMNS[5], line)?,
        volume_currency: parse_float(record.get(vol_cur), RAW_COLUMNS[6], line)?,
        weighted_price: parse_float(record.get(weighted), RAW_COLUMNS[7], line)?,
    })
}

fn is_null(cell: &str) -> bool {
    cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null")
}

fn parse_float(cell: Option<&str>, column: &'static str, line: u64) -> Result<Option<f64>, IngestError> {
    match cell {
        None => Ok(None),
        Some(c) if is_null(c) => Ok(None),
        Some(c) => c
            .parse::<f64>()
            .map(Some)
            .map_err(|_| IngestError::InvalidValue {
                line,
                column,
                value: c.to_string(),
            }),
    }
}

fn parse_timestamp(cell: Option<&str>, line: u64) -> Result<Option<i64>, IngestError> {
    match cell {
        None => Ok(None),
        Some(c) if is_null(c) => Ok(None),
        Some(c) => c.parse::<i64>().map(Some).or_else(|_| {
            // Integral values written with a fractional part, e.g. "1325317920.0"
            match c.parse::<f64>() {
                Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(Some(v as i64)),
                _ => Err(IngestError::InvalidValue {
                    line,
                    column: RAW_COLUMNS[0],
                    value: c.to_string(),
                }),
            }
        }),
    }
}
