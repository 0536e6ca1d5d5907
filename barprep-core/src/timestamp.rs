//! Timestamp normalization to UTC milliseconds.
//!
//! Accepted inputs:
//! - polars `Datetime` (naive values are taken as UTC)
//! - polars `Date` (midnight UTC)
//! - integers (Unix epoch seconds)
//! - strings in RFC 3339 or common `YYYY-MM-DD[ HH:MM[:SS[.f]]][±HH:MM]` shapes
//!
//! Anything else maps to `None` rather than failing the run.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;

const MS_PER_DAY: i64 = 86_400_000;

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a textual timestamp into UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Convert a time column of any supported dtype to UTC epoch milliseconds.
pub fn to_utc_millis(column: &Column) -> PolarsResult<Vec<Option<i64>>> {
    match column.dtype() {
        DataType::Datetime(unit, _) => {
            let divisor = match unit {
                TimeUnit::Nanoseconds => 1_000_000,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1,
            };
            let physical = column.cast(&DataType::Int64)?;
            Ok(physical
                .i64()?
                .iter()
                .map(|v| v.map(|x| x.div_euclid(divisor)).and_then(representable))
                .collect())
        }
        DataType::Date => {
            let days = column.cast(&DataType::Int32)?;
            Ok(days
                .i32()?
                .iter()
                .map(|v| {
                    v.and_then(|d| i64::from(d).checked_mul(MS_PER_DAY))
                        .and_then(representable)
                })
                .collect())
        }
        DataType::String => Ok(column
            .str()?
            .iter()
            .map(|v| v.and_then(parse_timestamp).map(|dt| dt.timestamp_millis()))
            .collect()),
        dtype if dtype.is_integer() => {
            let secs = column.cast(&DataType::Int64)?;
            Ok(secs
                .i64()?
                .iter()
                .map(|v| v.and_then(|s| s.checked_mul(1_000)).and_then(representable))
                .collect())
        }
        _ => Ok(vec![None; column.len()]),
    }
}

/// Keep `ms` only if it is an instant chrono can represent.
fn representable(ms: i64) -> Option<i64> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|_| ms)
}
