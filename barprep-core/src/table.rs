//! Table types passed between pipeline stages.
//!
//! - [`RawTable`]: whatever the provider or file gave us, header levels and all.
//! - [`CanonicalTable`]: fixed lower-case OHLCV column names, any row order.
//! - [`CleanedTable`]: sorted, repaired, with `return` and `log_return`, no missing values.
//!
//! Each stage takes its input by value and hands back a fresh table.

use crate::error::SchemaError;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;

pub const DATETIME: &str = "datetime";
pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";
pub const RETURN: &str = "return";
pub const LOG_RETURN: &str = "log_return";

/// Canonical column order. `volume` is the only optional one.
pub const CANONICAL_COLUMNS: [&str; 6] = [DATETIME, OPEN, HIGH, LOW, CLOSE, VOLUME];

/// Price columns every canonical table must carry.
pub const PRICE_COLUMNS: [&str; 4] = [OPEN, HIGH, LOW, CLOSE];

/// Timestamp dtype of cleaned tables: UTC, millisecond resolution.
pub fn utc_datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, Some("UTC".into()))
}

// ── Raw ─────────────────────────────────────────────────────────────

/// Column header as delivered by the source: one label per header level,
/// outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnKey {
    labels: Vec<String>,
}

impl ColumnKey {
    pub fn single(label: impl Into<String>) -> Self {
        Self {
            labels: vec![label.into()],
        }
    }

    pub fn nested(labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Outermost label. Empty for a key with no labels.
    pub fn outer(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("")
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn depth(&self) -> usize {
        self.labels.len()
    }
}

/// A single raw column and its header key.
#[derive(Debug, Clone)]
pub struct RawColumn {
    pub key: ColumnKey,
    pub values: Column,
}

impl RawColumn {
    pub fn new(key: ColumnKey, values: Column) -> Self {
        Self { key, values }
    }
}

/// Table straight from a source, schema unknown.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// The source's row key (a timestamp for providers), under the name the
    /// source uses for it.
    pub index: Option<Column>,
    pub columns: Vec<RawColumn>,
    /// One optional name per header level.
    pub level_names: Vec<Option<String>>,
}

impl RawTable {
    /// Single-level table with no index, as a file reader produces.
    pub fn from_frame(frame: DataFrame) -> Self {
        let columns = frame
            .get_columns()
            .iter()
            .map(|c| RawColumn::new(ColumnKey::single(c.name().as_str()), c.clone()))
            .collect();
        Self {
            index: None,
            columns,
            level_names: Vec::new(),
        }
    }

    /// Row count. Taken from the index when present.
    pub fn height(&self) -> usize {
        self.index
            .as_ref()
            .map(Column::len)
            .or_else(|| self.columns.first().map(|c| c.values.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.height() == 0
    }

    /// True when any column header carries more than one level.
    pub fn is_multi_level(&self) -> bool {
        self.level_names.len() > 1 || self.columns.iter().any(|c| c.key.depth() > 1)
    }

    pub fn outer_labels(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.key.outer()).collect()
    }
}

// ── Canonical ───────────────────────────────────────────────────────

/// OHLCV table with canonical column names. Rows are in source order.
#[derive(Debug, Clone)]
pub struct CanonicalTable {
    frame: DataFrame,
}

impl CanonicalTable {
    /// Wrap a frame, checking every column name is canonical.
    pub fn try_from_frame(frame: DataFrame) -> Result<Self, SchemaError> {
        let mut seen: Vec<&str> = Vec::with_capacity(frame.width());
        for name in frame.get_column_names() {
            let name = name.as_str();
            if !CANONICAL_COLUMNS.contains(&name) {
                return Err(SchemaError::UnexpectedColumn(name.to_string()));
            }
            if seen.contains(&name) {
                return Err(SchemaError::DuplicateColumn(name.to_string()));
            }
            seen.push(name);
        }
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn has_volume(&self) -> bool {
        self.has_column(VOLUME)
    }
}

// ── Cleaned ─────────────────────────────────────────────────────────

/// One row of a cleaned table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedBar {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
    #[serde(rename = "return")]
    pub ret: f64,
    pub log_return: f64,
}

/// Chronologically ordered, gap-repaired table with returns.
///
/// Built only by the cleaner, so `datetime` is strictly increasing and no cell
/// is missing.
#[derive(Debug, Clone)]
pub struct CleanedTable {
    frame: DataFrame,
}

impl CleanedTable {
    pub(crate) fn from_clean_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn has_volume(&self) -> bool {
        self.frame.column(VOLUME).is_ok()
    }

    /// Timestamps as milliseconds since the Unix epoch.
    pub fn timestamps_ms(&self) -> Result<Vec<i64>, SchemaError> {
        let physical = self.frame.column(DATETIME)?.cast(&DataType::Int64)?;
        physical
            .i64()?
            .iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| SchemaError::Frame(format!("null datetime at row {i}"))))
            .collect()
    }

    /// Values of a float column.
    pub fn values(&self, name: &str) -> Result<Vec<f64>, SchemaError> {
        let values = float_column(&self.frame, name)?;
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| SchemaError::Frame(format!("null {name} at row {i}"))))
            .collect()
    }

    /// Typed rows.
    pub fn to_bars(&self) -> Result<Vec<CleanedBar>, SchemaError> {
        let timestamps = self.timestamps_ms()?;
        let open = self.values(OPEN)?;
        let high = self.values(HIGH)?;
        let low = self.values(LOW)?;
        let close = self.values(CLOSE)?;
        let volume = if self.has_volume() {
            Some(self.values(VOLUME)?)
        } else {
            None
        };
        let ret = self.values(RETURN)?;
        let log_return = self.values(LOG_RETURN)?;

        timestamps
            .iter()
            .enumerate()
            .map(|(i, &ms)| {
                let datetime = DateTime::<Utc>::from_timestamp_millis(ms)
                    .ok_or_else(|| SchemaError::Frame(format!("timestamp out of range: {ms}")))?;
                Ok(CleanedBar {
                    datetime,
                    open: open[i],
                    high: high[i],
                    low: low[i],
                    close: close[i],
                    volume: volume.as_ref().map(|v| v[i]),
                    ret: ret[i],
                    log_return: log_return[i],
                })
            })
            .collect()
    }

    /// Deterministic BLAKE3 hash over every cell in row order.
    pub fn fingerprint(&self) -> Result<String, SchemaError> {
        let mut hasher = blake3::Hasher::new();
        for bar in self.to_bars()? {
            hasher.update(&bar.datetime.timestamp_millis().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            if let Some(volume) = bar.volume {
                hasher.update(&volume.to_le_bytes());
            }
            hasher.update(&bar.ret.to_le_bytes());
            hasher.update(&bar.log_return.to_le_bytes());
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Drop the derived return columns so the table can be cleaned again.
    pub fn into_canonical(self) -> Result<CanonicalTable, SchemaError> {
        let frame = self.frame.drop_many([RETURN, LOG_RETURN]);
        CanonicalTable::try_from_frame(frame)
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> Result<(), SchemaError> {
        let mut frame = self.frame.clone();
        CsvWriter::new(&mut writer)
            .include_header(true)
            .finish(&mut frame)?;
        Ok(())
    }
}

/// Read a column as `f64`, casting non-float dtypes.
///
/// Unparsable cells come back as `None`; NaN is reported as `None` too.
pub(crate) fn float_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, SchemaError> {
    let column = frame
        .column(name)
        .map_err(|_| SchemaError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}
