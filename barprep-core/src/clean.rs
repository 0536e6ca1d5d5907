//! Cleaning and feature pipeline.
//!
//! Four steps over a canonical table:
//! 1. Parse `datetime` to UTC, stable-sort ascending (unparsed last), keep the
//!    first row of each timestamp.
//! 2. Treat zero volume as missing and fill by linear interpolation over row
//!    position. Edges without a neighbor on both sides stay missing.
//! 3. `return` and `log_return` from consecutive closes.
//! 4. Drop every row with a missing value.

use crate::error::SchemaError;
use crate::table::{
    float_column, utc_datetime_dtype, CanonicalTable, CleanedTable, CLOSE, DATETIME, HIGH,
    LOG_RETURN, LOW, OPEN, RETURN, VOLUME,
};
use crate::timestamp;
use polars::prelude::*;
use tracing::{debug, warn};

/// Row accounting for one cleaning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_in: usize,
    /// Timestamps that could not be parsed.
    pub unparsed_timestamps: usize,
    /// Rows discarded because an earlier row had the same timestamp.
    pub duplicate_timestamps: usize,
    /// Zero or missing volumes filled by interpolation.
    pub volumes_repaired: usize,
    /// Rows removed for carrying a missing value.
    pub rows_dropped: usize,
    pub rows_out: usize,
}

/// Turns a [`CanonicalTable`] into a [`CleanedTable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Cleaner;

impl Cleaner {
    pub fn new() -> Self {
        Self
    }

    /// Clean a table. Fails only when `close` or `datetime` is absent.
    pub fn process(&self, table: CanonicalTable) -> Result<CleanedTable, SchemaError> {
        let (cleaned, report) = self.process_with_report(table)?;
        debug!(?report, "cleaned table");
        if report.rows_in > 1 && report.rows_out == 0 {
            warn!(rows_in = report.rows_in, "cleaning dropped every row");
        }
        Ok(cleaned)
    }

    /// Like [`Cleaner::process`], also returning row accounting.
    pub fn process_with_report(
        &self,
        table: CanonicalTable,
    ) -> Result<(CleanedTable, CleanReport), SchemaError> {
        let frame = table.into_frame();
        for required in [CLOSE, DATETIME] {
            if frame.column(required).is_err() {
                return Err(SchemaError::MissingColumn(required.to_string()));
            }
        }

        let mut report = CleanReport {
            rows_in: frame.height(),
            ..Default::default()
        };

        // Step 1: temporal normalization.
        let stamps = timestamp::to_utc_millis(frame.column(DATETIME)?)?;
        report.unparsed_timestamps = stamps.iter().filter(|s| s.is_none()).count();
        let (frame, duplicates) = chronological(frame, stamps)?;
        report.duplicate_timestamps = duplicates;

        let datetime = frame.column(DATETIME)?.clone();
        let mut fields: Vec<(&'static str, Vec<Option<f64>>)> = Vec::new();
        for name in [OPEN, HIGH, LOW, CLOSE, VOLUME] {
            if frame.column(name).is_ok() {
                fields.push((name, float_column(&frame, name)?));
            }
        }

        // Step 2: volume repair.
        if let Some((_, volume)) = fields.iter_mut().find(|(name, _)| *name == VOLUME) {
            let gaps: Vec<Option<f64>> = volume
                .iter()
                .map(|v| v.filter(|x| *x != 0.0))
                .collect();
            let filled = interpolate_linear(&gaps);
            report.volumes_repaired = gaps
                .iter()
                .zip(&filled)
                .filter(|(before, after)| before.is_none() && after.is_some())
                .count();
            *volume = filled;
        }

        // Step 3: returns.
        let close = fields
            .iter()
            .find(|(name, _)| *name == CLOSE)
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default();
        let simple = simple_returns(close);
        let log = log_returns(close);
        fields.push((RETURN, simple));
        fields.push((LOG_RETURN, log));

        // Step 4: completeness. NaN was already mapped to null above.
        let mut columns = Vec::with_capacity(fields.len() + 1);
        columns.push(datetime.cast(&utc_datetime_dtype())?);
        for (name, values) in fields {
            columns.push(Column::new(name.into(), values));
        }
        let cleaned = DataFrame::new(columns)?.drop_nulls::<String>(None)?;

        report.rows_out = cleaned.height();
        report.rows_dropped = frame.height() - report.rows_out;
        Ok((CleanedTable::from_clean_frame(cleaned), report))
    }
}

/// Replace `datetime` with UTC milliseconds, stable-sort ascending with
/// unparsed rows last, and keep the first row of each parsed timestamp.
///
/// Returns the ordered frame and the number of duplicate rows removed.
fn chronological(mut frame: DataFrame, stamps: Vec<Option<i64>>) -> PolarsResult<(DataFrame, usize)> {
    frame.with_column(Column::new(DATETIME.into(), stamps))?;
    let sorted = frame
        .lazy()
        .sort(
            [DATETIME],
            SortMultipleOptions::default()
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?;

    let rows = sorted.height();
    let deduped = sorted
        .lazy()
        .filter(col(DATETIME).is_null().or(col(DATETIME).is_first_distinct()))
        .collect()?;
    let duplicates = rows - deduped.height();
    Ok((deduped, duplicates))
}

/// Fill interior gaps by linear interpolation over position.
///
/// Leading and trailing gaps have only one neighbor and stay `None`.
fn interpolate_linear(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut filled = values.to_vec();
    let mut last_known: Option<(usize, f64)> = None;

    for (i, value) in values.iter().enumerate() {
        let Some(right) = *value else { continue };
        if let Some((j, left)) = last_known {
            let span = (i - j) as f64;
            for (k, slot) in filled.iter_mut().enumerate().take(i).skip(j + 1) {
                let weight = (k - j) as f64 / span;
                *slot = Some(left + (right - left) * weight);
            }
        }
        last_known = Some((i, right));
    }
    filled
}

/// `close[i] / close[i-1] - 1`, missing for the first row.
fn simple_returns(close: &[Option<f64>]) -> Vec<Option<f64>> {
    pairwise(close, |prev, curr| curr / prev - 1.0)
}

/// `ln(close[i]) - ln(close[i-1])`, missing for the first row.
fn log_returns(close: &[Option<f64>]) -> Vec<Option<f64>> {
    pairwise(close, |prev, curr| curr.ln() - prev.ln())
}

fn pairwise(values: &[Option<f64>], f: impl Fn(f64, f64) -> f64) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i == 0 {
                return None;
            }
            match (values[i - 1], values[i]) {
                (Some(prev), Some(curr)) => Some(f(prev, curr)).filter(|x| !x.is_nan()),
                _ => None,
            }
        })
        .collect()
}
