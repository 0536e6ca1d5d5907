//! Ingestion: fetch or read a raw table and normalize it to the canonical schema.

pub mod normalize;

pub use normalize::TimeColumn;

use crate::config::SourceConfig;
use crate::data::{FetchRequest, FileTableReader, MarketDataProvider, TableReader, YahooProvider};
use crate::error::{PipelineError, SourceError};
use crate::table::{CanonicalTable, RawTable};
use tracing::{debug, warn};

/// Loads a [`CanonicalTable`] for a [`SourceConfig`].
///
/// Holds only immutable collaborators; every `load` returns a fresh table.
/// No caching and no retries here: retry policy belongs to the provider.
pub struct Ingestor {
    provider: Box<dyn MarketDataProvider>,
    reader: Box<dyn TableReader>,
}

impl Ingestor {
    pub fn new(provider: Box<dyn MarketDataProvider>, reader: Box<dyn TableReader>) -> Self {
        Self { provider, reader }
    }

    /// Yahoo Finance for remote sources, polars CSV/Parquet for files.
    pub fn with_defaults() -> Result<Self, SourceError> {
        Ok(Self::new(
            Box::new(YahooProvider::new()?),
            Box::new(FileTableReader::new()),
        ))
    }

    /// Fetch or read the configured source and normalize it.
    ///
    /// Row order is whatever the source provided.
    pub fn load(&self, cfg: &SourceConfig) -> Result<CanonicalTable, PipelineError> {
        cfg.validate()?;

        let table = match cfg {
            SourceConfig::Remote {
                symbol,
                interval,
                start,
                end,
            } => {
                let request = FetchRequest {
                    symbol: symbol.trim().to_string(),
                    interval: *interval,
                    start: *start,
                    end: *end,
                };
                let raw = self.provider.fetch(&request)?;
                ensure_rows(&raw, self.provider.name())?;

                let (table, time) = normalize::normalize_remote(raw)?;
                if time.is_degraded() {
                    warn!(
                        provider = self.provider.name(),
                        symbol = %request.symbol,
                        ?time,
                        "provider gave no Date or Datetime index; datetime comes from a fallback, treat this table as suspect"
                    );
                }
                table
            }
            SourceConfig::File { path } => {
                let raw = self.reader.read(path)?;
                ensure_rows(&raw, self.reader.name())?;
                normalize::normalize_file(raw)?
            }
        };

        debug!(
            source = %cfg.describe(),
            rows = table.height(),
            volume = table.has_volume(),
            "loaded canonical table"
        );
        Ok(table)
    }
}

fn ensure_rows(raw: &RawTable, source_name: &str) -> Result<(), SourceError> {
    if raw.is_empty() {
        return Err(SourceError::EmptyResult {
            source_name: source_name.to_string(),
        });
    }
    Ok(())
}
