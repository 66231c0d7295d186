//! Retry policy for transient HTTP failures.
//!
//! [`RetryPolicy`] decides whether a failed attempt is worth repeating and
//! how long to wait before doing so. It holds no state of its own; the
//! [`crate::fetch::FetchPolicy`] loop asks it after every attempt.
//!
//! With the defaults (4 retries, 1s base, exponential) a request that keeps
//! failing is attempted 5 times over roughly 15 seconds of backoff before the
//! last response is handed back to the caller.

use std::collections::BTreeSet;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// HTTP statuses retried by default. `403` is included because directory
/// sites answer rate-limited clients with it as often as with `429`.
pub const DEFAULT_RETRY_STATUSES: &[u16] = &[403, 429, 500, 502, 503, 504];

/// Delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for any single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Decides when and how long to back off between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    statuses: BTreeSet<u16>,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            statuses: DEFAULT_RETRY_STATUSES.iter().copied().collect(),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default statuses and delays.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Replaces the set of retryable HTTP statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Caps every backoff delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Number of retries allowed after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns `true` if `status` is in the retryable set.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }

    /// Returns `true` if the attempt numbered `attempt` (0-based) should be
    /// followed by another one.
    ///
    /// `status` is the HTTP status the attempt produced, or `None` for a
    /// transient transport failure (timeout, connection reset).
    #[must_use]
    pub fn should_retry(&self, attempt: u32, status: Option<u16>) -> bool {
        attempt < self.max_retries && status.is_none_or(|s| self.is_retryable_status(s))
    }

    /// Backoff before the retry that follows attempt `attempt` (0-based):
    /// `base * 2^attempt`, capped at the maximum delay.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(20)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
