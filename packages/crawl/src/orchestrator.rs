//! The row scheduler.
//!
//! [`Crawler::run`] walks every row at or after the ledger's resume point,
//! at most `concurrency` rows at a time. Each row is an independent session:
//! its index is the identity session key and its pages are fetched strictly
//! in order. Rows finish in any order; the [`ProgressLedger`] turns that
//! into a contiguous watermark.
//!
//! A row is marked done once its walk ends, whether it found records, hit an
//! error status, or could not be fetched at all. Rows are never retried as a
//! whole; retries happen per request inside the fetch policy. A walk cut
//! short by the stop signal is *not* marked done, so the next run repeats it.

use std::sync::Arc;

use futures::stream::{self, StreamExt as _};
use listcrawl_crawl_models::{CrawlSummary, RowSet, SeedRow};
use listcrawl_scraper::extract::extractor_for;
use listcrawl_scraper::fetch::FetchPolicy;
use listcrawl_scraper::identity::DEFAULT_USER_AGENTS;
use listcrawl_scraper::pagination::{PaginationWalker, StopSignal, WalkOutcome, WalkStatus};
use listcrawl_scraper::throttle::AutoThrottle;
use listcrawl_scraper::transport::{ReqwestTransport, Transport};

use crate::CrawlError;
use crate::config::{CrawlConfig, DEFAULT_CONCURRENCY};
use crate::ledger::ProgressLedger;
use crate::progress::ProgressCallback;
use crate::sink::RecordSink;

/// What happened to one dispatched row.
#[derive(Debug)]
enum RowResult {
    /// The row had no seed URL and was marked done without fetching.
    Empty,
    /// The row was walked.
    Walked(WalkOutcome),
}

/// Run counters, updated as row results arrive.
#[derive(Debug, Default)]
struct RunState {
    summary: CrawlSummary,
}

impl RunState {
    fn new(total_rows: u64, eligible_rows: u64) -> Self {
        Self {
            summary: CrawlSummary {
                total_rows,
                eligible_rows,
                ..CrawlSummary::default()
            },
        }
    }

    fn record(&mut self, result: &RowResult) {
        let summary = &mut self.summary;
        match result {
            RowResult::Empty => {
                summary.empty += 1;
                summary.completed += 1;
            }
            RowResult::Walked(outcome) => {
                summary.attempted += 1;
                summary.pages += u64::from(outcome.pages);
                summary.records += outcome.records;
                if outcome.is_finished() {
                    summary.completed += 1;
                } else {
                    summary.cancelled += 1;
                }
                if outcome.is_failure() {
                    summary.failed += 1;
                }
            }
        }
    }
}

/// Walks rows concurrently, writing records and tracking progress.
pub struct Crawler {
    walker: PaginationWalker,
    sink: Arc<dyn RecordSink>,
    ledger: Arc<ProgressLedger>,
    concurrency: usize,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("walker", &self.walker)
            .field("ledger", &self.ledger)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    /// Creates a crawler with the default concurrency.
    #[must_use]
    pub fn new(
        walker: PaginationWalker,
        sink: Arc<dyn RecordSink>,
        ledger: Arc<ProgressLedger>,
    ) -> Self {
        Self {
            walker,
            sink,
            ledger,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets the number of rows walked at once (at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Builds a crawler over a `reqwest` transport from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Client`] if the HTTP client cannot be created.
    pub fn from_config(
        config: &CrawlConfig,
        sink: Arc<dyn RecordSink>,
        ledger: Arc<ProgressLedger>,
    ) -> Result<Self, CrawlError> {
        let transport = Arc::new(ReqwestTransport::new(DEFAULT_USER_AGENTS[0])?);
        Ok(Self::with_transport(config, transport, sink, ledger))
    }

    /// Builds a crawler from `config` over an arbitrary transport.
    #[must_use]
    pub fn with_transport(
        config: &CrawlConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn RecordSink>,
        ledger: Arc<ProgressLedger>,
    ) -> Self {
        let fetch = FetchPolicy::new(transport)
            .with_identities(Arc::new(config.identity_policy()))
            .with_retry(config.retry_policy())
            .with_throttle(Arc::new(AutoThrottle::new(config.throttle_config())))
            .with_timeout(config.timeout());

        let walker = PaginationWalker::new(
            Arc::new(fetch),
            extractor_for(config.site),
            &config.source_site(),
        )
        .with_canonicalizer(Arc::new(config.canonicalizer()));

        Self::new(walker, sink, ledger).with_concurrency(config.concurrency)
    }

    /// Crawls every row of `rows` from the ledger's resume point on.
    ///
    /// Stops dispatching rows once `stop` is raised; walks already running
    /// end after their in-flight fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Sink`] if records could not be written and
    /// [`CrawlError::Ledger`] if progress could not be persisted. Either
    /// aborts the run; the affected row is not marked done.
    pub async fn run(
        &self,
        rows: &RowSet,
        stop: &StopSignal,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<CrawlSummary, CrawlError> {
        let resume_point = self.ledger.resume_point();
        let eligible: Vec<&SeedRow> = rows
            .rows
            .iter()
            .filter(|row| row.index >= resume_point)
            .collect();

        let mut state = RunState::new(rows.len() as u64, eligible.len() as u64);

        if eligible.is_empty() {
            log::info!(
                "Nothing to do: all {} rows are before the resume point {resume_point}",
                rows.len()
            );
        } else {
            log::info!(
                "Crawling {} of {} rows from index {resume_point} (concurrency={})",
                eligible.len(),
                rows.len(),
                self.concurrency,
            );
            progress.set_total(eligible.len() as u64);

            let mut results = stream::iter(eligible)
                .take_while(|_| futures::future::ready(!stop.is_stopped()))
                .map(|row| self.process_row(row, stop))
                .buffer_unordered(self.concurrency);

            while let Some(result) = results.next().await {
                let result = match result {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!("Aborting run: {e}");
                        progress.finish(format!("aborted: {e}"));
                        return Err(e);
                    }
                };
                state.record(&result);
                if !matches!(&result, RowResult::Walked(o) if !o.is_finished()) {
                    progress.inc(1);
                }
                progress.set_message(format!(
                    "{} records, {} failed",
                    state.summary.records, state.summary.failed
                ));
            }
        }

        state.summary.watermark = self.ledger.watermark();
        if stop.is_stopped() {
            log::warn!(
                "Stopped early; resume from index {} next run",
                state.summary.watermark.map_or(0, |w| w + 1)
            );
        }
        progress.finish(format!(
            "{}/{} rows completed",
            state.summary.completed, state.summary.eligible_rows
        ));

        Ok(state.summary)
    }

    async fn process_row(&self, row: &SeedRow, stop: &StopSignal) -> Result<RowResult, CrawlError> {
        if !row.has_seed() {
            log::warn!("[{}] empty seed URL, nothing to fetch", row.index);
            self.ledger.mark_done(row.index)?;
            return Ok(RowResult::Empty);
        }

        let outcome = self
            .walker
            .walk(row, stop, |records| self.sink.write(&records))
            .await?;

        match &outcome.status {
            WalkStatus::Completed => log::warn!(
                "[{}] done: {} record(s) from {} page(s) | {}",
                row.index,
                outcome.records,
                outcome.pages,
                row.seed_url,
            ),
            WalkStatus::ErrorStatus { status } => log::warn!(
                "[{}] done with HTTP {status}: {} record(s) from {} page(s) | {}",
                row.index,
                outcome.records,
                outcome.pages,
                row.seed_url,
            ),
            WalkStatus::Failed { url, error } => {
                log::warn!("[{}] failed at {url}: {error}", row.index);
            }
            WalkStatus::Cancelled => {
                log::info!(
                    "[{}] cancelled after {} page(s); not marked done",
                    row.index,
                    outcome.pages
                );
            }
        }

        if outcome.is_finished() {
            self.ledger.mark_done(row.index)?;
        }
        Ok(RowResult::Walked(outcome))
    }
}
