//! barprep core: OHLCV ingestion, schema normalization and cleaning.
//!
//! Pipeline: [`SourceConfig`] → [`Ingestor::load`] → [`Cleaner::process`] → [`CleanedTable`].
//!
//! - Config: remote provider or local file, as a tagged enum
//! - Data collaborators: Yahoo Finance chart API, polars CSV/Parquet reader
//! - Ingest: header flattening, time-column materialization, canonical names
//! - Clean: UTC ordering, zero-volume interpolation, returns, completeness

pub mod clean;
pub mod config;
pub mod data;
pub mod error;
pub mod ingest;
pub mod table;
pub mod timestamp;

pub use clean::{CleanReport, Cleaner};
pub use config::{Interval, SourceConfig, SourceParts};
pub use error::{ConfigError, PipelineError, SchemaError, SourceError};
pub use ingest::Ingestor;
pub use table::{CanonicalTable, CleanedBar, CleanedTable, RawTable};

/// Load and clean in one call. Any error aborts the run; nothing partial is returned.
pub fn run_pipeline(ingestor: &Ingestor, cfg: &SourceConfig) -> Result<CleanedTable, PipelineError> {
    let canonical = ingestor.load(cfg)?;
    Ok(Cleaner::new().process(canonical)?)
}
