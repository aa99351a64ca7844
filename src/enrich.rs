//! Cleaning and enrichment of raw ticks.
//!
//! The derivation deliberately goes through the string rendering of the
//! timestamp (`YYYY-MM-DD HH:MM:SS`, UTC) and splits it, rather than reading
//! calendar fields directly. Two quirks follow from that and are kept:
//! `date_time` ends up holding only the calendar date, and `year` is the text
//! before the first `-` of the date, so it depends on ISO date rendering.

use chrono::{DateTime, Datelike, NaiveDate};

use crate::frame::{Record, Value};
use crate::ingest::RawTick;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Numeric columns of an enriched tick, in display order
pub const NUMERIC_COLUMNS: [&str; 10] = [
    "Timestamp",
    "Open",
    "High",
    "Low",
    "Close",
    "VolBTC",
    "VolCurrency",
    "Weighted_Price",
    "hour",
    "day_of_week",
];

/// A tick with no nulls and derived calendar attributes
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedTick {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub vol_btc: f64,
    pub vol_currency: f64,
    pub weighted_price: f64,
    /// Calendar date of the tick; the time of day is dropped by the date cast
    pub date_time: NaiveDate,
    pub date: NaiveDate,
    /// `HH:MM:SS`
    pub time: String,
    pub hour: f64,
    /// 1 = Sunday ... 7 = Saturday
    pub day_of_week: u32,
    pub year: String,
}

impl EnrichedTick {
    /// Back to the raw shape (volume columns under their original names)
    pub fn to_raw(&self) -> RawTick {
        RawTick {
            timestamp: Some(self.timestamp),
            open: Some(self.open),
            high: Some(self.high),
            low: Some(self.low),
            close: Some(self.close),
            volume_btc: Some(self.vol_btc),
            volume_currency: Some(self.vol_currency),
            weighted_price: Some(self.weighted_price),
        }
    }
}

impl Record for EnrichedTick {
    fn value(&self, column: &str) -> Option<Value> {
        let value = match column {
            "Timestamp" => Value::Int(self.timestamp),
            "Open" => Value::Float(self.open),
            "High" => Value::Float(self.high),
            "Low" => Value::Float(self.low),
            "Close" => Value::Float(self.close),
            "VolBTC" => Value::Float(self.vol_btc),
            "VolCurrency" => Value::Float(self.vol_currency),
            "Weighted_Price" => Value::Float(self.weighted_price),
            "dateTime" => Value::Date(self.date_time),
            "date" => Value::Date(self.date),
            "time" => Value::Str(self.time.clone()),
            "hour" => Value::Float(self.hour),
            "day_of_week" => Value::Int(i64::from(self.day_of_week)),
            "year" => Value::Str(self.year.clone()),
            _ => return None,
        };
        Some(value)
    }
}

/// Counts reported by a cleaning pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleaningSummary {
    pub rows_in: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
}

/// Drop incomplete rows and derive the calendar columns.
pub fn clean_and_enrich(raw: &[RawTick]) -> (Vec<EnrichedTick>, CleaningSummary) {
    let enriched: Vec<EnrichedTick> = raw.iter().filter_map(enrich_tick).collect();

    let summary = CleaningSummary {
        rows_in: raw.len(),
        rows_kept: enriched.len(),
        rows_dropped: raw.len() - enriched.len(),
    };
    tracing::info!(
        "Cleaning kept {} of {} rows ({} dropped for nulls)",
        summary.rows_kept,
        summary.rows_in,
        summary.rows_dropped
    );

    (enriched, summary)
}

/// Enrich one row; `None` when any field (including the derived `dateTime`) is null
pub fn enrich_tick(raw: &RawTick) -> Option<EnrichedTick> {
    let timestamp = raw.timestamp?;
    // dateTime is derived before the null drop, so an unrepresentable
    // timestamp removes the row like any other null
    let date_time_str = from_unixtime(timestamp)?;

    let date_str = split_item(&date_time_str, ' ', 0)?;
    let time = split_item(&date_time_str, ' ', 1)?.to_string();
    let hour = split_item(&time, ':', 0)?.parse::<f64>().ok()?;

    let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).ok()?;
    let date_time = cast_to_date(&date_time_str)?;

    Some(EnrichedTick {
        timestamp,
        open: raw.open?,
        high: raw.high?,
        low: raw.low?,
        close: raw.close?,
        vol_btc: raw.volume_btc?,
        vol_currency: raw.volume_currency?,
        weighted_price: raw.weighted_price?,
        date_time,
        date,
        time,
        hour,
        day_of_week: day_of_week(date),
        year: year_of(date),
    })
}

/// Epoch seconds rendered as `YYYY-MM-DD HH:MM:SS` in UTC
pub fn from_unixtime(seconds: i64) -> Option<String> {
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.format(DATE_TIME_FORMAT).to_string())
}

/// Day of week with 1 = Sunday ... 7 = Saturday
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().number_from_sunday()
}

/// First `-` token of the date's ISO rendering
pub fn year_of(date: NaiveDate) -> String {
    let rendered = date.format(DATE_FORMAT).to_string();
    split_item(&rendered, '-', 0).unwrap_or_default().to_string()
}

/// Item `index` of `s` split on `sep`, like a SQL `split(..)[index]`
fn split_item(s: &str, sep: char, index: usize) -> Option<&str> {
    s.split(sep).nth(index)
}

/// Cast a `YYYY-MM-DD[ HH:MM:SS]` string to a date, keeping only the date part
fn cast_to_date(s: &str) -> Option<NaiveDate> {
    let head = split_item(s.trim(), ' ', 0)?;
    NaiveDate::parse_from_str(head, DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(timestamp: i64) -> RawTick {
        RawTick {
            timestamp: Some(timestamp),
            open: Some(4.39),
            high: Some(4.39),
            low: Some(4.39),
            close: Some(4.39),
            volume_btc: Some(0.45),
            volume_currency: Some(1.98),
            weighted_price: Some(4.39),
        }
    }

    #[test]
    fn test_from_unixtime_utc() {
        assert_eq!(from_unixtime(0).as_deref(), Some("1970-01-01 00:00:00"));
        assert_eq!(
            from_unixtime(1325317920).as_deref(),
            Some("2011-12-31 07:52:00")
        );
    }

    #[test]
    fn test_enrich_reference_row() {
        let enriched = enrich_tick(&tick(1325317920)).unwrap();

        assert_eq!(enriched.vol_btc, 0.45);
        assert_eq!(enriched.vol_currency, 1.98);
        assert_eq!(enriched.date, NaiveDate::from_ymd_opt(2011, 12, 31).unwrap());
        assert_eq!(enriched.time, "07:52:00");
        assert_eq!(enriched.hour, 7.0);
        assert_eq!(enriched.year, "2011");
        // 2011-12-31 was a Saturday
        assert_eq!(enriched.day_of_week, 7);
    }

    #[test]
    fn test_date_time_cast_drops_time_of_day() {
        let enriched = enrich_tick(&tick(1325317920)).unwrap();
        assert_eq!(enriched.date_time, enriched.date);
    }

    #[test]
    fn test_day_of_week_sunday_is_one() {
        let sunday = NaiveDate::from_ymd_opt(2021, 1, 3).unwrap();
        let monday = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();

        assert_eq!(day_of_week(sunday), 1);
        assert_eq!(day_of_week(monday), 2);
    }

    #[test]
    fn test_null_field_drops_row() {
        let mut incomplete = tick(1325317920);
        incomplete.volume_currency = None;

        let (enriched, summary) = clean_and_enrich(&[tick(1325317920), incomplete]);

        assert_eq!(enriched.len(), 1);
        assert_eq!(summary.rows_in, 2);
        assert_eq!(summary.rows_dropped, 1);
    }

    #[test]
    fn test_unrepresentable_timestamp_drops_row() {
        let (enriched, _) = clean_and_enrich(&[tick(i64::MAX)]);
        assert!(enriched.is_empty());
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let mut missing = tick(1325318040);
        missing.open = None;
        let raw = vec![tick(1325317920), missing, tick(1325318100)];

        let (first, _) = clean_and_enrich(&raw);
        let round_trip: Vec<RawTick> = first.iter().map(EnrichedTick::to_raw).collect();
        let (second, summary) = clean_and_enrich(&round_trip);

        assert_eq!(summary.rows_dropped, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_record_access_by_renamed_columns() {
        let enriched = enrich_tick(&tick(1325317920)).unwrap();

        assert_eq!(enriched.value("VolBTC"), Some(Value::Float(0.45)));
        assert_eq!(enriched.value("VolCurrency"), Some(Value::Float(1.98)));
        assert_eq!(enriched.value("Volume_(BTC)"), None);
        assert_eq!(enriched.value("year"), Some(Value::Str("2011".to_string())));
        assert_eq!(enriched.value("day_of_week"), Some(Value::Int(7)));
    }

    #[test]
    fn test_year_is_four_digits_for_modern_dates() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        assert_eq!(year_of(date), "2020");
    }

    // ==================== Property-Based Tests ====================

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        fn cell() -> impl Strategy<Value = Option<f64>> {
            prop::option::weighted(0.9, 0.01f64..100_000.0)
        }

        fn raw_tick() -> impl Strategy<Value = RawTick> {
            (
                prop::option::weighted(0.95, 0i64..4_102_444_800),
                cell(),
                cell(),
                cell(),
                cell(),
                cell(),
                cell(),
                cell(),
            )
                .prop_map(|(timestamp, open, high, low, close, vb, vc, wp)| RawTick {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume_btc: vb,
                    volume_currency: vc,
                    weighted_price: wp,
                })
        }

        proptest! {
            #[test]
            fn day_of_week_in_range(ts in 0i64..4_102_444_800) {
                let date = DateTime::from_timestamp(ts, 0).unwrap().date_naive();
                let dow = day_of_week(date);
                prop_assert!((1..=7).contains(&dow), "day_of_week {} out of range", dow);
            }

            #[test]
            fn day_of_week_consistent_within_a_day(day in 0i64..40_000, a in 0i64..86_400, b in 0i64..86_400) {
                let first = enrich_tick(&complete_tick(day * 86_400 + a)).unwrap();
                let second = enrich_tick(&complete_tick(day * 86_400 + b)).unwrap();
                prop_assert_eq!(first.date, second.date);
                prop_assert_eq!(first.day_of_week, second.day_of_week);
            }

            #[test]
            fn cleaning_is_idempotent(raw in prop::collection::vec(raw_tick(), 0..40)) {
                let (once, summary) = clean_and_enrich(&raw);
                let again_raw: Vec<RawTick> = once.iter().map(EnrichedTick::to_raw).collect();
                let (twice, second) = clean_and_enrich(&again_raw);

                prop_assert_eq!(summary.rows_kept + summary.rows_dropped, raw.len());
                prop_assert_eq!(second.rows_dropped, 0);
                prop_assert_eq!(once, twice);
            }
        }

        fn complete_tick(timestamp: i64) -> RawTick {
            RawTick {
                timestamp: Some(timestamp),
                open: Some(1.0),
                high: Some(1.0),
                low: Some(1.0),
                close: Some(1.0),
                volume_btc: Some(1.0),
                volume_currency: Some(1.0),
                weighted_price: Some(1.0),
            }
        }
    }
}
