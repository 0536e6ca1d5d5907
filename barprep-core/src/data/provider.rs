//! Data source collaborator traits.
//!
//! [`MarketDataProvider`] abstracts the remote fetch (Yahoo Finance, or a stub
//! in tests); [`TableReader`] abstracts reading a local file. The ingestor
//! only sees these traits, so either side can be swapped or mocked.

use crate::config::Interval;
use crate::error::SourceError;
use crate::table::RawTable;
use chrono::NaiveDate;
use std::path::Path;

/// Parameters of a single remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
}

/// Remote market-data provider.
///
/// Returns a table keyed by timestamp with at least `Open`, `High`, `Low`,
/// `Close` and optionally `Volume`, possibly under a two-level header.
/// Retry policy, if any, lives in the implementation.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for one symbol over a date range.
    fn fetch(&self, request: &FetchRequest) -> Result<RawTable, SourceError>;
}

/// Local tabular file reader. Returns columns as stored, no normalization.
pub trait TableReader: Send + Sync {
    fn name(&self) -> &str;

    fn read(&self, path: &Path) -> Result<RawTable, SourceError>;
}
