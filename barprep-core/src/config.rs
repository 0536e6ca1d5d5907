//! Source configuration.
//!
//! A [`SourceConfig`] says where bars come from: the remote provider (symbol,
//! interval, date range) or a local file (path). The variant carries exactly
//! the fields it needs, so "remote without a symbol" cannot be represented;
//! the remaining checks live in [`SourceConfig::validate`].

use crate::error::ConfigError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Sampling granularity accepted by the remote provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
    NinetyMinutes,
    #[default]
    OneHour,
    OneDay,
    FiveDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::OneMinute,
        Interval::TwoMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::SixtyMinutes,
        Interval::NinetyMinutes,
        Interval::OneHour,
        Interval::OneDay,
        Interval::FiveDays,
        Interval::OneWeek,
        Interval::OneMonth,
        Interval::ThreeMonths,
    ];

    /// Provider wire form, e.g. `"1h"` or `"1wk"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::SixtyMinutes => "60m",
            Interval::NinetyMinutes => "90m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
            Interval::FiveDays => "5d",
            Interval::OneWeek => "1wk",
            Interval::OneMonth => "1mo",
            Interval::ThreeMonths => "3mo",
        }
    }

    /// True for sub-daily bars. Providers key these by date-time rather than date.
    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            Interval::OneMinute
                | Interval::TwoMinutes
                | Interval::FiveMinutes
                | Interval::FifteenMinutes
                | Interval::ThirtyMinutes
                | Interval::SixtyMinutes
                | Interval::NinetyMinutes
                | Interval::OneHour
        )
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownInterval(s.to_string()))
    }
}

impl TryFrom<String> for Interval {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}

/// Where the bars come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Remote market-data provider. `end` is exclusive.
    #[serde(alias = "yfinance", alias = "yahoo")]
    Remote {
        symbol: String,
        #[serde(default)]
        interval: Interval,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Local CSV or Parquet file.
    #[serde(alias = "csv")]
    File { path: PathBuf },
}

/// Untyped configuration fields, as they arrive from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct SourceParts<'a> {
    pub source: &'a str,
    pub symbol: Option<&'a str>,
    pub interval: Option<&'a str>,
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub path: Option<&'a Path>,
}

impl SourceConfig {
    /// Build and validate a config from loose fields.
    pub fn from_parts(parts: &SourceParts<'_>) -> Result<Self, ConfigError> {
        let cfg = match parts.source.trim().to_ascii_lowercase().as_str() {
            "remote" | "yfinance" | "yahoo" => {
                let symbol = parts.symbol.ok_or(ConfigError::MissingField {
                    field: "symbol",
                    kind: "remote",
                })?;
                let start = parts.start.ok_or(ConfigError::MissingField {
                    field: "start",
                    kind: "remote",
                })?;
                let end = parts.end.ok_or(ConfigError::MissingField {
                    field: "end",
                    kind: "remote",
                })?;
                let interval = parts
                    .interval
                    .map(str::parse::<Interval>)
                    .transpose()?
                    .unwrap_or_default();
                SourceConfig::Remote {
                    symbol: symbol.to_string(),
                    interval,
                    start: parse_date(start)?,
                    end: parse_date(end)?,
                }
            }
            "file" | "csv" => {
                let path = parts.path.ok_or(ConfigError::MissingField {
                    field: "path",
                    kind: "file",
                })?;
                SourceConfig::File {
                    path: path.to_path_buf(),
                }
            }
            other => return Err(ConfigError::UnknownSource(other.to_string())),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document and validate it.
    ///
    /// ```toml
    /// source = "remote"
    /// symbol = "QQQ"
    /// interval = "1h"
    /// start = "2025-10-21"
    /// end = "2025-10-22"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: SourceConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.message().to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Check the invariants the variant shape cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SourceConfig::Remote {
                symbol, start, end, ..
            } => {
                if symbol.trim().is_empty() {
                    return Err(ConfigError::EmptyField("symbol"));
                }
                if start >= end {
                    return Err(ConfigError::EmptyDateRange {
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                }
            }
            SourceConfig::File { path } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::EmptyField("path"));
                }
            }
        }
        Ok(())
    }

    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            SourceConfig::Remote {
                symbol,
                interval,
                start,
                end,
            } => format!("{symbol} {interval} {start}..{end}"),
            SourceConfig::File { path } => path.display().to_string(),
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        value: value.to_string(),
    })
}
