//! Yahoo Finance data provider.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API. Handles retries with
//! exponential backoff and response parsing.
//!
//! The result is shaped the way multi-symbol-capable clients shape a
//! single-symbol answer: a two-level `(Price, Ticker)` header and a timestamp
//! index named `Datetime` for intraday intervals or `Date` otherwise.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.
//! The file source is the fallback when Yahoo is unavailable.

use super::provider::{FetchRequest, MarketDataProvider};
use crate::error::SourceError;
use crate::table::{utc_datetime_dtype, ColumnKey, RawColumn, RawTable};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new() -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Override the retry budget.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// Point at another chart API host, e.g. a mirror or a local test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the chart API URL. `end` is exclusive: the range stops at its midnight UTC.
    fn chart_url(&self, request: &FetchRequest) -> String {
        let start_ts = midnight_utc(request.start);
        let end_ts = midnight_utc(request.end);
        format!(
            "{base}/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval={interval}\
             &includePrePost=false",
            base = self.base_url.trim_end_matches('/'),
            symbol = request.symbol,
            interval = request.interval,
        )
    }

    /// Parse the chart API response into a two-level raw table.
    fn parse_response(request: &FetchRequest, resp: ChartResponse) -> Result<RawTable, SourceError> {
        let symbol = request.symbol.as_str();
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    SourceError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    SourceError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                SourceError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormatChanged("result array is empty".into()))?;

        // No timestamps means no bars in range.
        let timestamps = data.timestamp.unwrap_or_default();

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormatChanged("no quote data".into()))?;

        let n = timestamps.len();
        let mut index = Vec::with_capacity(n);
        let mut open = Vec::with_capacity(n);
        let mut high = Vec::with_capacity(n);
        let mut low = Vec::with_capacity(n);
        let mut close = Vec::with_capacity(n);
        let mut volume = Vec::with_capacity(n);

        for (i, &ts) in timestamps.iter().enumerate() {
            let o = quote.open.get(i).copied().flatten();
            let h = quote.high.get(i).copied().flatten();
            let l = quote.low.get(i).copied().flatten();
            let c = quote.close.get(i).copied().flatten();
            let v = quote.volume.get(i).copied().flatten();

            // Skip bars where all OHLCV are None (holidays/non-trading periods)
            if o.is_none() && h.is_none() && l.is_none() && c.is_none() && v.is_none() {
                trace!(symbol, ts, "skipping empty bar");
                continue;
            }

            let ms = ts.checked_mul(1_000).ok_or_else(|| {
                SourceError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })?;
            index.push(ms);
            open.push(o);
            high.push(h);
            low.push(l);
            close.push(c);
            volume.push(v);
        }

        let index_name = if request.interval.is_intraday() {
            "Datetime"
        } else {
            "Date"
        };
        let index = Column::new(index_name.into(), index)
            .cast(&utc_datetime_dtype())
            .map_err(|e| SourceError::ResponseFormatChanged(format!("timestamp column: {e}")))?;

        let field = |label: &str, values: Column| {
            RawColumn::new(ColumnKey::nested([label, symbol]), values)
        };
        let columns = vec![
            field("Close", Column::new("Close".into(), close)),
            field("High", Column::new("High".into(), high)),
            field("Low", Column::new("Low".into(), low)),
            field("Open", Column::new("Open".into(), open)),
            field("Volume", Column::new("Volume".into(), volume)),
        ];

        Ok(RawTable {
            index: Some(index),
            columns,
            level_names: vec![Some("Price".into()), Some("Ticker".into())],
        })
    }

    /// Execute the HTTP request with retry logic.
    fn fetch_with_retry(&self, request: &FetchRequest) -> Result<RawTable, SourceError> {
        let symbol = request.symbol.as_str();
        let url = self.chart_url(request);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying chart request");
                std::thread::sleep(delay);
            }

            debug!(symbol, %url, attempt, "requesting chart");
            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();
                    debug!(symbol, status = status.as_u16(), "chart response");

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(SourceError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(SourceError::AuthenticationRequired(format!(
                            "Yahoo Finance refused the request (HTTP {status})"
                        )));
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(SourceError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if !status.is_success() {
                        last_error = Some(SourceError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        SourceError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    return Self::parse_response(request, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(SourceError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(SourceError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Other("max retries exceeded".into())))
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<RawTable, SourceError> {
        self.fetch_with_retry(request)
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}
