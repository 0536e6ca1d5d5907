//! Raw → canonical schema normalization.
//!
//! Each step is a plain function over a [`RawTable`] so it can be tested on
//! its own:
//! 1. [`flatten_header`] drops secondary header levels.
//! 2. [`materialize_time_column`] turns the provider's index into a `datetime` column.
//! 3. [`to_canonical`] maps names, projects onto the canonical columns and casts prices.

use crate::error::SchemaError;
use crate::table::{
    CanonicalTable, ColumnKey, RawColumn, RawTable, CANONICAL_COLUMNS, DATETIME, VOLUME,
};
use polars::prelude::*;
use tracing::debug;

/// Index names providers use for the timestamp key.
const TIME_INDEX_NAMES: [&str; 2] = ["Date", "Datetime"];

/// How the `datetime` column was obtained from a provider table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeColumn {
    /// Index carried a recognized name (`Date` or `Datetime`).
    Named(String),
    /// Degraded: index had another name (or none) and was used as-is.
    IndexFallback(Option<String>),
    /// Degraded: no index at all, row ordinals used.
    OrdinalFallback,
}

impl TimeColumn {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, TimeColumn::Named(_))
    }
}

/// If columns carry a secondary header level, keep only the outermost label.
///
/// Level names are dropped in every case.
pub fn flatten_header(raw: RawTable) -> RawTable {
    if raw.is_multi_level() {
        debug!(levels = raw.level_names.len(), "flattening multi-level header");
    }
    let columns = raw
        .columns
        .into_iter()
        .map(|c| {
            let key = ColumnKey::single(c.key.outer());
            let values = c.values.with_name(key.outer().into());
            RawColumn::new(key, values)
        })
        .collect();
    RawTable {
        index: raw.index,
        columns,
        level_names: Vec::new(),
    }
}

/// Move the provider's index into an explicit leading `datetime` column.
///
/// A `Date` or `Datetime` index is renamed. Anything else takes the degraded
/// path: the index values (or row ordinals, without an index) become
/// `datetime`. The returned [`TimeColumn`] says which path was taken; callers
/// report degraded tables.
pub fn materialize_time_column(raw: &mut RawTable) -> TimeColumn {
    let height = raw.height();
    let (values, source) = match raw.index.take() {
        Some(index) => {
            let name = index.name().to_string();
            if TIME_INDEX_NAMES.contains(&name.as_str()) {
                (index, TimeColumn::Named(name))
            } else {
                let label = (!name.is_empty()).then_some(name);
                (index, TimeColumn::IndexFallback(label))
            }
        }
        None => {
            let ordinals: Vec<i64> = (0..height as i64).collect();
            (
                Column::new(DATETIME.into(), ordinals),
                TimeColumn::OrdinalFallback,
            )
        }
    };

    let values = values.with_name(DATETIME.into());
    raw.columns
        .insert(0, RawColumn::new(ColumnKey::single(DATETIME), values));
    source
}

/// Canonical name for a raw column label.
///
/// Provider names `Open/High/Low/Close/Volume` map to their lower-case form;
/// every other label is lower-cased.
pub fn canonical_name(label: &str) -> String {
    match label {
        "Open" => "open".to_string(),
        "High" => "high".to_string(),
        "Low" => "low".to_string(),
        "Close" => "close".to_string(),
        "Volume" => "volume".to_string(),
        other => other.trim().to_lowercase(),
    }
}

/// Project a flat raw table onto the canonical schema.
///
/// A `date` column stands in for `datetime` when the latter is absent.
/// Columns outside the canonical set are dropped. Price and volume columns are
/// cast to `Float64`; cells that do not parse become missing.
pub fn to_canonical(raw: RawTable) -> Result<CanonicalTable, SchemaError> {
    let mut named: Vec<(String, Column)> = raw
        .columns
        .into_iter()
        .map(|c| (canonical_name(c.key.outer()), c.values))
        .collect();

    if !named.iter().any(|(name, _)| name == DATETIME) {
        if let Some(entry) = named.iter_mut().find(|(name, _)| name == "date") {
            entry.0 = DATETIME.to_string();
        }
    }

    let mut dropped = Vec::new();
    let mut selected: Vec<Option<Column>> = vec![None; CANONICAL_COLUMNS.len()];
    for (name, values) in named {
        match CANONICAL_COLUMNS.iter().position(|c| *c == name) {
            Some(slot) => {
                if selected[slot].is_some() {
                    return Err(SchemaError::DuplicateColumn(name));
                }
                selected[slot] = Some(values.with_name(name.as_str().into()));
            }
            None => dropped.push(name),
        }
    }
    if !dropped.is_empty() {
        debug!(?dropped, "dropping non-canonical columns");
    }

    for (name, column) in CANONICAL_COLUMNS.iter().zip(&selected) {
        if *name != VOLUME && column.is_none() {
            return Err(SchemaError::MissingColumn(name.to_string()));
        }
    }

    let mut columns = Vec::with_capacity(CANONICAL_COLUMNS.len());
    for column in selected.into_iter().flatten() {
        if column.name().as_str() == DATETIME {
            columns.push(column);
        } else {
            columns.push(column.cast(&DataType::Float64)?);
        }
    }

    let frame = DataFrame::new(columns)?;
    CanonicalTable::try_from_frame(frame)
}

/// Full normalization for a provider table.
pub fn normalize_remote(raw: RawTable) -> Result<(CanonicalTable, TimeColumn), SchemaError> {
    let mut flat = flatten_header(raw);
    let time = materialize_time_column(&mut flat);
    let table = to_canonical(flat)?;
    Ok((table, time))
}

/// Full normalization for a file table. Files have no index to materialize.
pub fn normalize_file(raw: RawTable) -> Result<CanonicalTable, SchemaError> {
    to_canonical(flatten_header(raw))
}
