//! Local file reader for CSV and Parquet.

use super::provider::TableReader;
use crate::error::SourceError;
use crate::table::RawTable;
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Reads CSV (header row required) or Parquet, chosen by file extension.
///
/// Columns come back exactly as stored.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTableReader;

impl FileTableReader {
    pub fn new() -> Self {
        Self
    }

    fn read_csv(path: &Path) -> PolarsResult<DataFrame> {
        LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()?
            .collect()
    }

    fn read_parquet(path: &Path) -> PolarsResult<DataFrame> {
        LazyFrame::scan_parquet(path, Default::default())?.collect()
    }
}

impl TableReader for FileTableReader {
    fn name(&self) -> &str {
        "file"
    }

    fn read(&self, path: &Path) -> Result<RawTable, SourceError> {
        if !path.is_file() {
            return Err(SourceError::Read {
                path: path.to_path_buf(),
                reason: "no such file".into(),
            });
        }

        let is_parquet = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("parquet"));

        let frame = if is_parquet {
            Self::read_parquet(path)
        } else {
            Self::read_csv(path)
        }
        .map_err(|e| SourceError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!(
            path = %path.display(),
            rows = frame.height(),
            columns = frame.width(),
            "read table"
        );
        Ok(RawTable::from_frame(frame))
    }
}
