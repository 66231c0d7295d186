#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resumable crawl runs.
//!
//! A run reads seed rows from a CSV file ([`input`]), walks each row's pages
//! with bounded concurrency ([`orchestrator`]), appends every extracted
//! record to an output CSV ([`sink`]), and records which rows are finished
//! in a progress file ([`ledger`]) so an interrupted run picks up where it
//! left off. [`config`] holds the TOML run configuration and [`split`]
//! divides large inputs into parts that can be crawled separately.

pub mod config;
pub mod input;
pub mod ledger;
pub mod orchestrator;
pub mod progress;
pub mod sink;
pub mod split;

use std::path::PathBuf;
use std::sync::Arc;

use listcrawl_crawl_models::CrawlSummary;
use listcrawl_scraper::extract::extractor_for;
use listcrawl_scraper::pagination::StopSignal;

use crate::config::CrawlConfig;
use crate::ledger::ProgressLedger;
use crate::orchestrator::Crawler;
use crate::progress::ProgressCallback;
use crate::sink::CsvSink;

/// Errors loading or validating the run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`CrawlConfig`].
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors reading the seed input.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The input has a header but no data rows.
    #[error("No input rows found in {}", .0.display())]
    Empty(PathBuf),

    /// A required column is not in the header.
    #[error("Column '{column}' not found in {}", path.display())]
    MissingColumn {
        /// The missing column name.
        column: String,
        /// Input file path.
        path: PathBuf,
    },

    /// A split was requested with zero parts.
    #[error("Cannot split into {0} parts")]
    InvalidParts(usize),
}

/// Errors writing output records.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors reading or persisting the progress file.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The progress file exists but could not be read.
    #[error("Failed to read progress file {}: {source}", path.display())]
    Read {
        /// Progress file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The watermark could not be written.
    #[error("Failed to write progress file {}: {source}", path.display())]
    Write {
        /// Progress file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Errors that end a crawl run.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Seed input problem.
    #[error(transparent)]
    Input(#[from] InputError),

    /// Output write failure.
    #[error("Output write failed: {0}")]
    Sink(#[from] SinkError),

    /// Progress file failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The HTTP client could not be created.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Runs a crawl described by `config`: loads the input, opens the output and
/// progress files, and walks every row from the resume point on.
///
/// # Errors
///
/// Returns [`CrawlError`] for startup failures (missing input, unreadable
/// progress file, unopenable output) and for output write failures during
/// the run. Row-level fetch failures are counted in the summary instead.
pub async fn run(
    config: &CrawlConfig,
    stop: &StopSignal,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<CrawlSummary, CrawlError> {
    config.validate()?;

    let input_path = config.input_path()?;
    let rows = input::load_rows(
        input_path,
        &config.seed_column,
        config.passthrough_columns.as_deref(),
    )?;

    let output = config.output_path(chrono::Local::now());
    let progress_path = config.progress_path(&output);

    let ledger = Arc::new(ProgressLedger::open(&progress_path, config.skip)?);
    log::info!(
        "Loaded {} rows from {} | resume at {} | output {} | progress {}",
        rows.len(),
        input_path.display(),
        ledger.resume_point(),
        output.display(),
        progress_path.display(),
    );

    let fields = extractor_for(config.site).fields();
    let sink = Arc::new(CsvSink::open(
        &output,
        sink::output_columns(&rows.columns, fields),
    )?);

    Crawler::from_config(config, sink, ledger)?
        .run(&rows, stop, progress)
        .await
}
