#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core data types shared by the listcrawl packages.
//!
//! A crawl run loads a [`RowSet`] of [`SeedRow`]s, walks the pages reachable
//! from each row's seed URL, and writes one [`ExtractedRecord`] per listing
//! found. Outbound requests carry an [`Identity`] chosen per row session.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Output column holding the seed row index a record came from.
pub const ROW_INDEX_COLUMN: &str = "row_index";

/// Output column holding the URL the record was extracted for.
pub const SOURCE_URL_COLUMN: &str = "source_url";

/// Output column holding the site tag stamped on every record.
pub const SOURCE_SITE_COLUMN: &str = "source_site";

/// The page layout a crawl targets.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SiteProfile {
    /// Paginated business directory listing pages (many listings per page,
    /// followed through `Next` links).
    #[default]
    Directory,
    /// Single map place pages (one listing per page, no pagination).
    Place,
}

/// One unit of crawl work, derived from one input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRow {
    /// 0-based position in the input. Used as the resumption key and as the
    /// identity session key.
    pub index: u64,
    /// Where the walk starts. Empty means there is nothing to fetch.
    pub seed_url: String,
    /// Input values copied verbatim into every record produced by this row.
    pub passthrough: BTreeMap<String, String>,
}

impl SeedRow {
    /// Creates a row with no pass-through values.
    #[must_use]
    pub fn new(index: u64, seed_url: &str) -> Self {
        Self {
            index,
            seed_url: seed_url.trim().to_owned(),
            passthrough: BTreeMap::new(),
        }
    }

    /// Adds a pass-through value.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.passthrough.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Returns `true` if the row has a seed URL worth fetching.
    #[must_use]
    pub fn has_seed(&self) -> bool {
        !self.seed_url.trim().is_empty()
    }
}

/// The full ordered input, plus the column order of the pass-through values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    /// Pass-through column names in input order.
    pub columns: Vec<String>,
    /// Rows in input order; `rows[i].index == i`.
    pub rows: Vec<SeedRow>,
}

impl RowSet {
    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Transient state for the page currently being processed in a walk.
#[derive(Debug, Clone)]
pub struct PageContext<'a> {
    /// The row this walk belongs to.
    pub row: &'a SeedRow,
    /// The URL that was fetched for this page.
    pub current_url: String,
    /// 1-based page number within the walk.
    pub page_number: u32,
    /// Records emitted so far for this page.
    pub records_emitted_on_page: usize,
}

impl<'a> PageContext<'a> {
    /// Creates the context for one fetched page.
    #[must_use]
    pub fn new(row: &'a SeedRow, current_url: &str, page_number: u32) -> Self {
        Self {
            row,
            current_url: current_url.to_owned(),
            page_number,
            records_emitted_on_page: 0,
        }
    }
}

/// One output record.
///
/// Every field named by the extractor schema is present; fields missing from
/// the page hold an empty string so the sink always sees the same columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    /// Index of the seed row that produced this record.
    pub row_index: u64,
    /// URL of the listing (or the page it was found on).
    pub source_url: String,
    /// Site tag from the run configuration.
    pub source_site: String,
    /// Extracted values keyed by schema field name.
    pub fields: BTreeMap<String, String>,
    /// Pass-through values from the seed row.
    pub passthrough: BTreeMap<String, String>,
}

impl ExtractedRecord {
    /// Builds a record for `row`, keeping only the `schema` fields from
    /// `values` and defaulting the missing ones to empty strings.
    #[must_use]
    pub fn new(
        row: &SeedRow,
        schema: &[&str],
        mut values: BTreeMap<String, String>,
        source_url: &str,
        source_site: &str,
    ) -> Self {
        let fields = schema
            .iter()
            .map(|name| {
                let value = values.remove(*name).unwrap_or_default();
                ((*name).to_owned(), value)
            })
            .collect();

        Self {
            row_index: row.index,
            source_url: source_url.to_owned(),
            source_site: source_site.to_owned(),
            fields,
            passthrough: row.passthrough.clone(),
        }
    }

    /// Returns the extracted value for `name`, or `""`.
    #[must_use]
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map_or("", String::as_str)
    }

    /// Returns the value to write under an output column.
    ///
    /// Extracted fields shadow pass-through values of the same name.
    #[must_use]
    pub fn column_value(&self, column: &str) -> String {
        match column {
            ROW_INDEX_COLUMN => self.row_index.to_string(),
            SOURCE_URL_COLUMN => self.source_url.clone(),
            SOURCE_SITE_COLUMN => self.source_site.clone(),
            _ => self
                .fields
                .get(column)
                .or_else(|| self.passthrough.get(column))
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// An outbound request identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Extra headers sent with every request made under this identity.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Counters describing a finished (or stopped) crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    /// Rows in the input.
    pub total_rows: u64,
    /// Rows at or after the resume point.
    pub eligible_rows: u64,
    /// Rows whose walk was started.
    pub attempted: u64,
    /// Rows marked done this run (including failures and empty seeds).
    pub completed: u64,
    /// Rows whose walk ended in a fetch failure or an error status.
    pub failed: u64,
    /// Rows skipped because their seed URL was empty.
    pub empty: u64,
    /// Rows stopped by the stop signal before finishing.
    pub cancelled: u64,
    /// Pages fetched.
    pub pages: u64,
    /// Records written.
    pub records: u64,
    /// Contiguous watermark at the end of the run.
    pub watermark: Option<u64>,
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows {}/{} completed (attempted={}, failed={}, empty={}, cancelled={}) | \
             pages={} records={} watermark={}",
            self.completed,
            self.eligible_rows,
            self.attempted,
            self.failed,
            self.empty,
            self.cancelled,
            self.pages,
            self.records,
            self.watermark
                .map_or_else(|| "none".to_owned(), |w| w.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn record_defaults_missing_fields_to_empty() {
        let row = SeedRow::new(3, "https://example.com").with_field("city_name", "Ottawa");
        let mut values = BTreeMap::new();
        values.insert("business_name".to_owned(), "Joe's".to_owned());
        values.insert("not_in_schema".to_owned(), "x".to_owned());

        let record = ExtractedRecord::new(
            &row,
            &["business_name", "phone"],
            values,
            "https://example.com/l/1",
            "example.com",
        );

        assert_eq!(record.field("business_name"), "Joe's");
        assert_eq!(record.field("phone"), "");
        assert!(!record.fields.contains_key("not_in_schema"));
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.column_value(ROW_INDEX_COLUMN), "3");
        assert_eq!(record.column_value("city_name"), "Ottawa");
        assert_eq!(record.column_value("unknown"), "");
    }

    #[test]
    fn extracted_fields_shadow_passthrough() {
        let row = SeedRow::new(0, "u").with_field("city", "input city");
        let mut values = BTreeMap::new();
        values.insert("city".to_owned(), "page city".to_owned());

        let record = ExtractedRecord::new(&row, &["city"], values, "u", "s");

        assert_eq!(record.column_value("city"), "page city");
    }

    #[test]
    fn blank_seed_is_not_fetchable() {
        assert!(!SeedRow::new(0, "   ").has_seed());
        assert!(SeedRow::new(0, " https://a.b ").has_seed());
        assert_eq!(SeedRow::new(0, " https://a.b ").seed_url, "https://a.b");
    }

    #[test]
    fn site_profile_parses_from_snake_case() {
        assert_eq!(SiteProfile::from_str("place").unwrap(), SiteProfile::Place);
        assert_eq!(SiteProfile::Directory.to_string(), "directory");
        assert_eq!(
            SiteProfile::from_str("maps"),
            Err(strum::ParseError::VariantNotFound)
        );
    }
}
