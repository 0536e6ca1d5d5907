//! Structured error types for the pipeline.
//!
//! Three families, matching who is at fault:
//! - [`ConfigError`]: the caller built an invalid or incomplete `SourceConfig`.
//! - [`SourceError`]: the provider or file reader failed or returned unusable data.
//! - [`SchemaError`]: a required column is missing or the table shape is not canonical.
//!
//! These are designed to be displayable directly in CLI output.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or incomplete source configuration. Never retryable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown data source '{0}' (expected 'remote' or 'file')")]
    UnknownSource(String),

    #[error("missing required field '{field}' for {kind} source")]
    MissingField {
        field: &'static str,
        kind: &'static str,
    },

    #[error("unknown interval '{0}'")]
    UnknownInterval(String),

    #[error("invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("start date {start} must be before end date {end}")]
    EmptyDateRange { start: String, end: String },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("failed to read config file {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    Parse(String),
}

/// The external provider or file reader failed, or returned nothing usable.
///
/// May be transient; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("{source_name} returned an empty table")]
    EmptyResult { source_name: String },

    #[error("provider error: {0}")]
    Other(String),
}

/// The table does not have the columns the pipeline needs.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("duplicate column after normalization: {0}")]
    DuplicateColumn(String),

    #[error("column '{0}' is not part of the canonical schema")]
    UnexpectedColumn(String),

    #[error("frame error: {0}")]
    Frame(String),
}

impl From<polars::prelude::PolarsError> for SchemaError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        SchemaError::Frame(err.to_string())
    }
}

/// Any failure of a pipeline run. Aborts the run for that configuration.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}
