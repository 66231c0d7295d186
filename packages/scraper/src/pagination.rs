//! Walking a row's chain of result pages.
//!
//! [`PaginationWalker::walk`] starts at a row's seed URL and repeatedly
//! fetches a page, extracts its records, hands them to the caller, and
//! follows the page's next link until there is none. Termination is purely
//! link-driven; a visited set guards against sites whose last page links
//! back to an earlier one.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use listcrawl_crawl_models::{ExtractedRecord, PageContext, SeedRow};
use url::Url;

use crate::canonical::Canonicalizer;
use crate::extract::{PageExtractor, RawRecord};
use crate::fetch::{FetchError, FetchPolicy};

/// Cooperative run-wide stop flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a signal that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. No new rows, pages or retries start afterwards.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`Self::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkStatus {
    /// Ran out of next links.
    Completed,
    /// Ran out of next links, but at least one page answered with a non-2xx
    /// status (the last such status is kept).
    ErrorStatus {
        /// HTTP status.
        status: u16,
    },
    /// A fetch produced no response even after retries.
    Failed {
        /// The URL that could not be fetched.
        url: String,
        /// Why.
        error: String,
    },
    /// The stop signal was raised before the walk finished.
    Cancelled,
}

/// Result of walking one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    /// The row walked.
    pub row_index: u64,
    /// Pages fetched (error-status pages included).
    pub pages: u32,
    /// Records emitted.
    pub records: u64,
    /// How the walk ended.
    pub status: WalkStatus,
}

impl WalkOutcome {
    const fn new(row_index: u64) -> Self {
        Self {
            row_index,
            pages: 0,
            records: 0,
            status: WalkStatus::Completed,
        }
    }

    /// Returns `true` if the row should be marked done.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self.status, WalkStatus::Cancelled)
    }

    /// Returns `true` for failed fetches and error statuses.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self.status,
            WalkStatus::Failed { .. } | WalkStatus::ErrorStatus { .. }
        )
    }
}

/// Drives fetch, extract and advance for one row at a time.
pub struct PaginationWalker {
    fetch: Arc<FetchPolicy>,
    extractor: Arc<dyn PageExtractor>,
    canonicalizer: Arc<Canonicalizer>,
    source_site: String,
}

impl std::fmt::Debug for PaginationWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationWalker")
            .field("extractor", &self.extractor.name())
            .field("source_site", &self.source_site)
            .finish_non_exhaustive()
    }
}

impl PaginationWalker {
    /// Creates a walker with the default canonicalizer.
    #[must_use]
    pub fn new(
        fetch: Arc<FetchPolicy>,
        extractor: Arc<dyn PageExtractor>,
        source_site: &str,
    ) -> Self {
        Self {
            fetch,
            extractor,
            canonicalizer: Arc::new(Canonicalizer::default()),
            source_site: source_site.to_owned(),
        }
    }

    /// Sets the canonicalizer applied to URL-typed fields.
    #[must_use]
    pub fn with_canonicalizer(mut self, canonicalizer: Arc<Canonicalizer>) -> Self {
        self.canonicalizer = canonicalizer;
        self
    }

    /// Walks `row` from its seed URL, passing each page's records to `emit`.
    ///
    /// A row without a seed URL completes immediately without fetching.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `emit`; the walk stops there.
    pub async fn walk<E, F>(
        &self,
        row: &SeedRow,
        stop: &StopSignal,
        mut emit: F,
    ) -> Result<WalkOutcome, E>
    where
        F: FnMut(Vec<ExtractedRecord>) -> Result<(), E>,
    {
        let mut outcome = WalkOutcome::new(row.index);
        if !row.has_seed() {
            return Ok(outcome);
        }

        let mut current = row.seed_url.clone();
        let mut visited = BTreeSet::new();
        let mut page_number: u32 = 1;

        loop {
            if stop.is_stopped() {
                log::debug!("[{}] stopped before {current}", row.index);
                outcome.status = WalkStatus::Cancelled;
                return Ok(outcome);
            }
            visited.insert(current.clone());

            let response = match self.fetch.fetch(&current, row.index, stop).await {
                Ok(response) => response,
                Err(FetchError::Cancelled { .. }) => {
                    log::debug!("[{}] stopped while fetching {current}", row.index);
                    outcome.status = WalkStatus::Cancelled;
                    return Ok(outcome);
                }
                Err(e @ FetchError::Failed { .. }) => {
                    log::warn!("[{}] {e}", row.index);
                    outcome.status = WalkStatus::Failed {
                        url: current,
                        error: e.to_string(),
                    };
                    return Ok(outcome);
                }
            };
            outcome.pages += 1;
            visited.insert(response.url.clone());

            if !response.is_success() {
                log::warn!(
                    "[{}] HTTP {} for page {page_number}: {}",
                    row.index,
                    response.status,
                    response.url,
                );
                outcome.status = WalkStatus::ErrorStatus {
                    status: response.status,
                };
            }

            let mut page = PageContext::new(row, &response.url, page_number);
            let extraction = self.extractor.extract(&page, &response.body);
            let records: Vec<ExtractedRecord> = extraction
                .records
                .into_iter()
                .map(|raw| self.finish_record(&page, raw))
                .collect();
            page.records_emitted_on_page = records.len();
            outcome.records += records.len() as u64;

            log::debug!(
                "[{}] page {} -> {} record(s) from {}",
                row.index,
                page.page_number,
                page.records_emitted_on_page,
                page.current_url,
            );

            if !records.is_empty() {
                emit(records)?;
            }

            let Some(next) = extraction
                .next_url
                .and_then(|href| resolve(&response.url, &href))
            else {
                break;
            };

            if visited.contains(&next) {
                log::warn!(
                    "[{}] pagination cycle at page {page_number}: {next} already visited",
                    row.index,
                );
                break;
            }

            current = next;
            page_number += 1;
        }

        Ok(outcome)
    }

    fn finish_record(&self, page: &PageContext<'_>, mut raw: RawRecord) -> ExtractedRecord {
        for field in self.extractor.url_fields() {
            if let Some(value) = raw.values.get_mut(*field) {
                if !value.is_empty() {
                    *value = self.canonicalizer.canonicalize(value).unwrap_or_default();
                }
            }
        }

        let source_url = raw.source_url.as_deref().unwrap_or(&page.current_url);
        ExtractedRecord::new(
            page.row,
            self.extractor.fields(),
            raw.values,
            source_url,
            &self.source_site,
        )
    }
}

/// Resolves `href` against the URL of the page it was found on.
fn resolve(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let resolved = match Url::parse(base) {
        Ok(base) => base.join(href),
        Err(_) => Url::parse(href),
    };
    resolved
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
}
