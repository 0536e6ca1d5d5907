//! barprep CLI: fetch or read OHLCV bars and print or save the cleaned table.
//!
//! Commands:
//! - `fetch`: pull bars for one symbol from Yahoo Finance
//! - `file`: read a local CSV or Parquet export
//! - `run`: take the source from a TOML config file

use anyhow::{Context, Result};
use barprep_core::{run_pipeline, CleanedTable, Ingestor, SourceConfig, SourceParts};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "barprep",
    about = "barprep: OHLCV ingestion and cleaning"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter used when RUST_LOG is unset (e.g. debug, barprep_core=trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Write the cleaned table as CSV instead of printing it.
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch bars from Yahoo Finance.
    Fetch {
        /// Ticker symbol (e.g., QQQ).
        #[arg(long)]
        symbol: String,

        /// Bar interval: 1m 2m 5m 15m 30m 60m 90m 1h 1d 5d 1wk 1mo 3mo.
        #[arg(long, default_value = "1h")]
        interval: String,

        /// Start date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD), exclusive.
        #[arg(long)]
        end: String,
    },
    /// Read a local CSV or Parquet file.
    File {
        /// Path to the file.
        #[arg(long)]
        path: PathBuf,
    },
    /// Load the source from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let cfg = match &cli.command {
        Commands::Fetch {
            symbol,
            interval,
            start,
            end,
        } => SourceConfig::from_parts(&SourceParts {
            source: "remote",
            symbol: Some(symbol.as_str()),
            interval: Some(interval.as_str()),
            start: Some(start.as_str()),
            end: Some(end.as_str()),
            path: None,
        })?,
        Commands::File { path } => SourceConfig::from_parts(&SourceParts {
            source: "file",
            path: Some(path.as_path()),
            ..Default::default()
        })?,
        Commands::Run { config } => SourceConfig::from_file(config)
            .with_context(|| format!("loading config {}", config.display()))?,
    };

    let ingestor = Ingestor::with_defaults()?;
    let cleaned = run_pipeline(&ingestor, &cfg)
        .with_context(|| format!("processing {}", cfg.describe()))?;

    match &cli.output {
        Some(path) => write_output(&cleaned, path)?,
        None => print_table(&cleaned),
    }
    Ok(())
}

/// Subscriber on stderr so stdout carries only the table.
fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("invalid log level '{default_level}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn write_output(cleaned: &CleanedTable, path: &Path) -> Result<()> {
    // Never leave a partial file at `path`.
    let partial = path.with_extension("partial");
    let file = File::create(&partial)
        .with_context(|| format!("creating {}", partial.display()))?;
    if let Err(e) = cleaned.write_csv(BufWriter::new(file)) {
        let _ = std::fs::remove_file(&partial);
        return Err(e).with_context(|| format!("writing {}", path.display()));
    }
    std::fs::rename(&partial, path)
        .with_context(|| format!("moving output into {}", path.display()))?;

    info!(rows = cleaned.height(), path = %path.display(), "wrote cleaned table");
    println!("{} rows written to {}", cleaned.height(), path.display());
    Ok(())
}

fn print_table(cleaned: &CleanedTable) {
    println!("{}", cleaned.frame());
    println!("{} rows", cleaned.height());
}
