//! Output sinks.
//!
//! Records are appended as soon as a page is extracted. The sink is shared
//! by every worker, so writes are serialized behind a mutex and flushed per
//! batch: once a row is marked done its records are already on disk.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use listcrawl_crawl_models::{
    ExtractedRecord, ROW_INDEX_COLUMN, SOURCE_SITE_COLUMN, SOURCE_URL_COLUMN,
};

use crate::SinkError;

/// Destination for extracted records.
pub trait RecordSink: Send + Sync {
    /// Appends `records` durably.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the records could not be written.
    fn write(&self, records: &[ExtractedRecord]) -> Result<(), SinkError>;
}

/// Output column order: `row_index`, the pass-through columns, the
/// extractor fields, then `source_url` and `source_site`. Names already
/// present are not repeated.
#[must_use]
pub fn output_columns(passthrough: &[String], fields: &[&str]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let names = std::iter::once(ROW_INDEX_COLUMN)
        .chain(passthrough.iter().map(String::as_str))
        .chain(fields.iter().copied())
        .chain([SOURCE_URL_COLUMN, SOURCE_SITE_COLUMN]);

    for name in names {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_owned());
        }
    }
    columns
}

/// Append-only CSV file sink.
#[derive(Debug)]
pub struct CsvSink {
    columns: Vec<String>,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvSink {
    /// Opens `path` for appending, writing the header row when the file is
    /// new or empty. An existing non-empty file is assumed to already carry
    /// a matching header.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the file cannot be opened or the header
    /// cannot be written.
    pub fn open(path: &Path, columns: Vec<String>) -> Result<Self, SinkError> {
        let needs_header = std::fs::metadata(path).map_or(true, |m| m.len() == 0);
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(&columns)?;
            writer.flush()?;
        } else {
            log::info!("Appending to existing output {}", path.display());
        }

        Ok(Self {
            columns,
            writer: Mutex::new(writer),
        })
    }
}

impl RecordSink for CsvSink {
    fn write(&self, records: &[ExtractedRecord]) -> Result<(), SinkError> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for record in records {
            writer.write_record(self.columns.iter().map(|c| record.column_value(c)))?;
        }
        writer.flush()?;
        drop(writer);

        Ok(())
    }
}
