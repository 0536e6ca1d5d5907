//! End-to-end pipeline tests with stub collaborators.
//!
//! The stub provider hands back tables shaped like a multi-symbol-capable
//! client's single-symbol answer, so these cover header flattening, index
//! materialization and cleaning together without touching the network.

use barprep_core::data::{FetchRequest, MarketDataProvider, TableReader};
use barprep_core::ingest::normalize;
use barprep_core::table::{utc_datetime_dtype, ColumnKey, RawColumn};
use barprep_core::{
    run_pipeline, CanonicalTable, Cleaner, ConfigError, Ingestor, Interval, PipelineError,
    RawTable, SchemaError, SourceConfig, SourceError,
};
use chrono::{NaiveDate, TimeZone, Utc};
use polars::prelude::*;
use std::path::Path;
use std::sync::{Arc, Mutex};

const HOUR_MS: i64 = 3_600_000;
const T0: i64 = 1_761_053_400_000; // 2025-10-21 13:30 UTC

// ── Stubs ────────────────────────────────────────────────────────────

struct StubProvider {
    table: RawTable,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StubProvider {
    fn new(table: RawTable) -> Self {
        Self {
            table,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MarketDataProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<RawTable, SourceError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.table.clone())
    }
}

/// Lets a test keep a handle on a provider the ingestor owns.
struct SharedProvider(Arc<StubProvider>);

impl MarketDataProvider for SharedProvider {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn fetch(&self, request: &FetchRequest) -> Result<RawTable, SourceError> {
        self.0.fetch(request)
    }
}

struct FailingProvider;

impl MarketDataProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<RawTable, SourceError> {
        Err(SourceError::SymbolNotFound {
            symbol: request.symbol.clone(),
        })
    }
}

struct NoFiles;

impl TableReader for NoFiles {
    fn name(&self) -> &str {
        "no_files"
    }

    fn read(&self, path: &Path) -> Result<RawTable, SourceError> {
        Err(SourceError::Read {
            path: path.to_path_buf(),
            reason: "stub has no files".into(),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Two-level (Price, Ticker) provider table.
fn provider_table(index_name: Option<&str>, stamps: &[i64], close: &[f64], volume: &[f64]) -> RawTable {
    let index = index_name.map(|name| {
        Column::new(name.into(), stamps.to_vec())
            .cast(&utc_datetime_dtype())
            .unwrap()
    });
    let field = |label: &str, values: Vec<f64>| {
        RawColumn::new(
            ColumnKey::nested([label, "QQQ"]),
            Column::new(label.into(), values),
        )
    };
    RawTable {
        index,
        columns: vec![
            field("Close", close.to_vec()),
            field("High", close.iter().map(|c| c + 1.0).collect()),
            field("Low", close.iter().map(|c| c - 1.0).collect()),
            field("Open", close.to_vec()),
            field("Volume", volume.to_vec()),
        ],
        level_names: vec![Some("Price".into()), Some("Ticker".into())],
    }
}

fn hourly(n: usize) -> Vec<i64> {
    (0..n as i64).map(|i| T0 + i * HOUR_MS).collect()
}

fn remote_cfg() -> SourceConfig {
    SourceConfig::Remote {
        symbol: "QQQ".into(),
        interval: Interval::OneHour,
        start: NaiveDate::from_ymd_opt(2025, 10, 21).unwrap(),
        end: NaiveDate::from_ymd_opt(2025, 10, 22).unwrap(),
    }
}

fn ingestor_with(table: RawTable) -> Ingestor {
    Ingestor::new(Box::new(StubProvider::new(table)), Box::new(NoFiles))
}

fn canonical(frame: DataFrame) -> CanonicalTable {
    CanonicalTable::try_from_frame(frame).unwrap()
}

fn ohlcv(datetime: &[&str], close: &[f64], volume: &[f64]) -> CanonicalTable {
    canonical(
        df!(
            "datetime" => datetime,
            "open" => close,
            "high" => close,
            "low" => close,
            "close" => close,
            "volume" => volume,
        )
        .unwrap(),
    )
}

// ── Properties ───────────────────────────────────────────────────────

#[test]
fn zero_volume_between_neighbors_is_interpolated_and_kept() {
    let raw = provider_table(
        Some("Datetime"),
        &hourly(3),
        &[100.0, 101.0, 102.0],
        &[100.0, 0.0, 300.0],
    );
    let cleaned = run_pipeline(&ingestor_with(raw), &remote_cfg()).unwrap();
    let bars = cleaned.to_bars().unwrap();

    // The first row has no return and is dropped; the repaired row survives.
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].datetime.timestamp_millis(), T0 + HOUR_MS);
    assert_eq!(bars[0].volume, Some(200.0));
    assert_eq!(bars[1].volume, Some(300.0));
}

#[test]
fn returns_from_consecutive_closes() {
    let table = ohlcv(
        &["2024-01-02", "2024-01-03"],
        &[100.0, 110.0],
        &[1.0, 1.0],
    );
    let bars = Cleaner::new().process(table).unwrap().to_bars().unwrap();
    assert_eq!(bars.len(), 1);
    assert!((bars[0].ret - 0.10).abs() < 1e-12);
    assert!((bars[0].log_return - 1.10f64.ln()).abs() < 1e-12);
}

#[test]
fn zero_or_one_row_yields_empty_table() {
    let empty = canonical(
        df!(
            "datetime" => Vec::<&str>::new(),
            "close" => Vec::<f64>::new(),
        )
        .unwrap(),
    );
    let cleaned = Cleaner::new().process(empty).unwrap();
    assert!(cleaned.is_empty());

    let single = ohlcv(&["2024-01-02"], &[100.0], &[1.0]);
    let cleaned = Cleaner::new().process(single).unwrap();
    assert!(cleaned.is_empty());
    assert_eq!(
        cleaned.frame().get_column_names().len(),
        8,
        "empty result keeps the full cleaned schema"
    );
}

#[test]
fn missing_close_is_schema_error() {
    let table = canonical(
        df!(
            "datetime" => &["2024-01-02", "2024-01-03"],
            "open" => &[1.0, 2.0],
        )
        .unwrap(),
    );
    let err = Cleaner::new().process(table).unwrap_err();
    assert!(matches!(err, SchemaError::MissingColumn(name) if name == "close"));
}

#[test]
fn two_level_header_is_flattened_without_residual_labels() {
    let raw = provider_table(
        Some("Datetime"),
        &hourly(2),
        &[100.0, 101.0],
        &[10.0, 20.0],
    );
    assert!(raw.is_multi_level());

    let table = ingestor_with(raw).load(&remote_cfg()).unwrap();
    let names: Vec<String> = table
        .frame()
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(names, ["datetime", "open", "high", "low", "close", "volume"]);
    for label in ["Price", "Ticker", "QQQ"] {
        assert!(!names.iter().any(|n| n == label), "residual header label {label}");
    }
}

#[test]
fn cleaning_is_idempotent_up_to_the_leading_row() {
    let table = ohlcv(
        &["2024-01-05", "2024-01-02", "2024-01-04", "2024-01-03", "2024-01-08"],
        &[104.0, 101.0, 103.0, 102.0, 105.0],
        &[500.0, 100.0, 0.0, 300.0, 700.0],
    );
    let once = Cleaner::new().process(table).unwrap();
    let once_bars = once.to_bars().unwrap();

    let twice = Cleaner::new()
        .process(once.clone().into_canonical().unwrap())
        .unwrap();
    let twice_bars = twice.to_bars().unwrap();

    assert_eq!(twice_bars.len(), once_bars.len() - 1);
    for (a, b) in once_bars[1..].iter().zip(&twice_bars) {
        assert_eq!(a.datetime, b.datetime);
        assert_eq!(a.close, b.close);
        assert_eq!(a.volume, b.volume);
        assert!((a.ret - b.ret).abs() < 1e-12);
        assert!((a.log_return - b.log_return).abs() < 1e-12);
    }
}

#[test]
fn unrepairable_edge_volumes_drop_their_rows() {
    // Leading and trailing zeros have no neighbor on one side. They are
    // dropped rather than failing the run.
    let table = ohlcv(
        &["2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05", "2024-01-08"],
        &[100.0, 101.0, 102.0, 103.0, 104.0],
        &[0.0, 0.0, 300.0, 400.0, 0.0],
    );
    let (cleaned, report) = Cleaner::new().process_with_report(table).unwrap();
    let bars = cleaned.to_bars().unwrap();

    assert_eq!(report.volumes_repaired, 0);
    assert_eq!(bars.len(), 2);
    assert_eq!(
        bars[0].datetime,
        Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap()
    );
    assert_eq!(bars[1].volume, Some(400.0));
}

#[test]
fn output_is_strictly_increasing_across_offsets() {
    // 09:30-04:00 is 13:30 UTC, after 13:00Z despite sorting earlier as text.
    let table = ohlcv(
        &[
            "2025-10-21 09:30:00-04:00",
            "2025-10-21T13:00:00Z",
            "2025-10-21 14:30:00+00:00",
            "2025-10-21T13:00:00Z",
        ],
        &[101.0, 100.0, 102.0, 99.0],
        &[10.0, 10.0, 10.0, 10.0],
    );
    let (cleaned, report) = Cleaner::new().process_with_report(table).unwrap();
    assert_eq!(report.duplicate_timestamps, 1);

    let stamps = cleaned.timestamps_ms().unwrap();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(cleaned.values("close").unwrap(), vec![101.0, 102.0]);
    assert_eq!(
        cleaned.frame().column("datetime").unwrap().dtype(),
        &utc_datetime_dtype()
    );
}

#[test]
fn unparsable_timestamps_are_dropped_not_fatal() {
    let table = ohlcv(
        &["2024-01-02", "not a date", "2024-01-03", "2024-01-04"],
        &[100.0, 999.0, 101.0, 102.0],
        &[1.0, 1.0, 1.0, 1.0],
    );
    let (cleaned, report) = Cleaner::new().process_with_report(table).unwrap();
    assert_eq!(report.unparsed_timestamps, 1);
    assert_eq!(cleaned.values("close").unwrap(), vec![101.0, 102.0]);
}

#[test]
fn out_of_range_epochs_are_dropped_before_output() {
    let day = 86_400i64;
    let table = canonical(
        df!(
            "datetime" => &[
                1_704_153_600i64,
                1_000_000_000_000_000,
                1_704_153_600 + day,
                1_000_000_000_000_000 + 3_600,
                1_704_153_600 + 2 * day,
            ],
            "open" => &[100.0, 1.0, 101.0, 1.0, 102.0],
            "high" => &[100.0, 1.0, 101.0, 1.0, 102.0],
            "low" => &[100.0, 1.0, 101.0, 1.0, 102.0],
            "close" => &[100.0, 1.0, 101.0, 1.0, 102.0],
            "volume" => &[10.0, 10.0, 10.0, 10.0, 10.0],
        )
        .unwrap(),
    );
    let (cleaned, report) = Cleaner::new().process_with_report(table).unwrap();
    assert_eq!(report.unparsed_timestamps, 2);

    let bars = cleaned.to_bars().unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(
        bars[1].datetime,
        Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap()
    );

    let mut csv = Vec::new();
    cleaned.write_csv(&mut csv).unwrap();
    assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 3);
    assert!(!format!("{}", cleaned.frame()).is_empty());
}

#[test]
fn row_order_does_not_change_the_result() {
    let sorted = ohlcv(
        &["2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05"],
        &[100.0, 101.0, 99.0, 103.0],
        &[10.0, 0.0, 30.0, 40.0],
    );
    let shuffled = ohlcv(
        &["2024-01-04", "2024-01-02", "2024-01-05", "2024-01-03"],
        &[99.0, 100.0, 103.0, 101.0],
        &[30.0, 10.0, 40.0, 0.0],
    );
    let a = Cleaner::new().process(sorted).unwrap().fingerprint().unwrap();
    let b = Cleaner::new().process(shuffled).unwrap().fingerprint().unwrap();
    assert_eq!(a, b);
}

#[test]
fn table_without_volume_skips_repair() {
    let table = canonical(
        df!(
            "datetime" => &["2024-01-02", "2024-01-03"],
            "open" => &[1.0, 2.0],
            "high" => &[1.0, 2.0],
            "low" => &[1.0, 2.0],
            "close" => &[1.0, 2.0],
        )
        .unwrap(),
    );
    let cleaned = Cleaner::new().process(table).unwrap();
    assert!(!cleaned.has_volume());
    assert_eq!(cleaned.to_bars().unwrap()[0].volume, None);
}

// ── Ingestor contract ────────────────────────────────────────────────

#[test]
fn ingestor_forwards_fetch_parameters() {
    let provider = Arc::new(StubProvider::new(provider_table(
        Some("Datetime"),
        &hourly(2),
        &[1.0, 2.0],
        &[1.0, 1.0],
    )));
    let ingestor = Ingestor::new(Box::new(SharedProvider(provider.clone())), Box::new(NoFiles));
    let cfg = SourceConfig::Remote {
        symbol: "  QQQ ".into(),
        interval: Interval::FiveMinutes,
        start: NaiveDate::from_ymd_opt(2025, 10, 21).unwrap(),
        end: NaiveDate::from_ymd_opt(2025, 10, 22).unwrap(),
    };
    ingestor.load(&cfg).unwrap();

    let recorded = provider.requests.lock().unwrap();
    assert_eq!(
        *recorded,
        vec![FetchRequest {
            symbol: "QQQ".into(),
            interval: Interval::FiveMinutes,
            start: NaiveDate::from_ymd_opt(2025, 10, 21).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 10, 22).unwrap(),
        }]
    );
}

#[test]
fn provider_failure_propagates_as_source_error() {
    let ingestor = Ingestor::new(Box::new(FailingProvider), Box::new(NoFiles));
    let err = ingestor.load(&remote_cfg()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Source(SourceError::SymbolNotFound { symbol }) if symbol == "QQQ"
    ));
}

#[test]
fn empty_provider_result_is_source_error() {
    let raw = provider_table(Some("Datetime"), &[], &[], &[]);
    let err = ingestor_with(raw).load(&remote_cfg()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Source(SourceError::EmptyResult { source_name }) if source_name == "stub"
    ));
}

#[test]
fn invalid_config_fails_before_any_fetch() {
    let cfg = SourceConfig::Remote {
        symbol: "QQQ".into(),
        interval: Interval::OneHour,
        start: NaiveDate::from_ymd_opt(2025, 10, 22).unwrap(),
        end: NaiveDate::from_ymd_opt(2025, 10, 21).unwrap(),
    };
    let ingestor = Ingestor::new(Box::new(FailingProvider), Box::new(NoFiles));
    let err = ingestor.load(&cfg).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Configuration(ConfigError::EmptyDateRange { .. })
    ));
}

#[test]
fn file_reader_failure_propagates() {
    let cfg = SourceConfig::File {
        path: "bars.csv".into(),
    };
    let err = ingestor_with(RawTable::default()).load(&cfg).unwrap_err();
    assert!(matches!(err, PipelineError::Source(SourceError::Read { .. })));
}

#[test]
fn foreign_index_name_still_loads_via_fallback() {
    let raw = provider_table(
        Some("timestamp"),
        &hourly(3),
        &[100.0, 101.0, 102.0],
        &[1.0, 1.0, 1.0],
    );
    let cleaned = run_pipeline(&ingestor_with(raw), &remote_cfg()).unwrap();
    assert_eq!(cleaned.height(), 2);
}

#[test]
fn missing_index_falls_back_to_ordinals() {
    let raw = provider_table(None, &hourly(3), &[100.0, 101.0, 102.0], &[1.0, 1.0, 1.0]);
    let mut flat = normalize::flatten_header(raw);
    let time = normalize::materialize_time_column(&mut flat);
    assert!(time.is_degraded());

    let table = normalize::to_canonical(flat).unwrap();
    let cleaned = Cleaner::new().process(table).unwrap();
    // Ordinals 0, 1, 2 read as epoch seconds: still strictly increasing.
    assert_eq!(cleaned.timestamps_ms().unwrap(), vec![1_000, 2_000]);
}
