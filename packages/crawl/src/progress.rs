//! Progress reporting for crawl runs.
//!
//! The orchestrator reports row-level progress through [`ProgressCallback`]
//! without knowing how (or whether) it is rendered. The CLI plugs in an
//! `indicatif` bar; tests and library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running crawl.
///
/// Implementations must be `Send + Sync` so one instance can be shared
/// across concurrently walked rows.
pub trait ProgressCallback: Send + Sync {
    /// Set the total number of rows this run will process.
    fn set_total(&self, total: u64);

    /// Advance by `delta` rows.
    fn inc(&self, delta: u64);

    /// Update the status line shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Mark the run complete with a final message.
    fn finish(&self, msg: String);
}

/// A [`ProgressCallback`] that ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
