//! Crash-safe progress tracking.
//!
//! Rows finish in any order, but progress is stored as a single number: the
//! highest row index such that it and every index below it are done (the
//! *watermark*). Rows finished above a gap are remembered in memory and
//! folded into the watermark once the gap closes. After a crash, rows above
//! the watermark are simply crawled again.
//!
//! The progress file holds the watermark as a decimal integer and is
//! replaced atomically (write to a temp file, then rename) on every advance.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::LedgerError;

#[derive(Debug)]
struct LedgerState {
    /// Lowest index not known to be done. Everything below is done.
    next: u64,
    /// Done indices at or above `next`.
    pending: BTreeSet<u64>,
}

/// Tracks finished rows and persists the contiguous watermark.
#[derive(Debug)]
pub struct ProgressLedger {
    path: Option<PathBuf>,
    resume_point: u64,
    state: Mutex<LedgerState>,
}

impl ProgressLedger {
    /// Opens the ledger backed by `path`.
    ///
    /// The resume point is `max(skip, watermark + 1)`; every index below it
    /// counts as done. A missing or empty file means nothing is done yet. A
    /// file that does not hold a number is ignored with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] if the file exists but cannot be read.
    pub fn open(path: &Path, skip: u64) -> Result<Self, LedgerError> {
        let watermark = read_watermark(path)?;
        let mut ledger = Self::with_start(skip, watermark);
        ledger.path = Some(path.to_path_buf());
        Ok(ledger)
    }

    /// Creates a ledger that is never persisted.
    #[must_use]
    pub fn in_memory(skip: u64) -> Self {
        Self::with_start(skip, None)
    }

    fn with_start(skip: u64, watermark: Option<u64>) -> Self {
        let resume_point = watermark.map_or(0, |w| w.saturating_add(1)).max(skip);
        Self {
            path: None,
            resume_point,
            state: Mutex::new(LedgerState {
                next: resume_point,
                pending: BTreeSet::new(),
            }),
        }
    }

    /// First row index this run should crawl.
    #[must_use]
    pub const fn resume_point(&self) -> u64 {
        self.resume_point
    }

    /// The highest index with every index up to it done, if any.
    #[must_use]
    pub fn watermark(&self) -> Option<u64> {
        self.lock().next.checked_sub(1)
    }

    #[cfg(test)]
    fn is_done(&self, index: u64) -> bool {
        let state = self.lock();
        index < state.next || state.pending.contains(&index)
    }

    /// Marks `index` done, advancing and persisting the watermark when the
    /// mark closes a gap. Marking an index twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Write`] if the advanced watermark could not be
    /// persisted. The in-memory state keeps the mark either way.
    pub fn mark_done(&self, index: u64) -> Result<(), LedgerError> {
        let mut state = self.lock();
        if index < state.next || !state.pending.insert(index) {
            return Ok(());
        }

        let before = state.next;
        loop {
            let next = state.next;
            if !state.pending.remove(&next) {
                break;
            }
            state.next = next + 1;
        }
        if state.next == before {
            return Ok(());
        }

        let watermark = state.next - 1;
        log::trace!("progress watermark -> {watermark}");
        // Persisting under the lock keeps file writes in watermark order.
        if let Some(path) = &self.path {
            write_watermark(path, watermark)?;
        }
        drop(state);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn read_watermark(path: &Path) -> Result<Option<u64>, LedgerError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<u64>() {
        Ok(watermark) => Ok(Some(watermark)),
        Err(e) => {
            log::warn!(
                "Ignoring unreadable progress file {} ({e}): {trimmed:?}",
                path.display()
            );
            Ok(None)
        }
    }
}

fn write_watermark(path: &Path, watermark: u64) -> Result<(), LedgerError> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, format!("{watermark}\n"))
        .and_then(|()| std::fs::rename(&tmp, path))
        .map_err(|source| LedgerError::Write {
            path: path.to_path_buf(),
            source,
        })
}
