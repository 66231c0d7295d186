//! The fetch policy: retries, backoff, timeouts, throttling and identity.
//!
//! All page fetches in a crawl go through [`FetchPolicy::fetch`] instead of
//! calling the [`Transport`] directly. For each attempt it:
//!
//! 1. asks the [`IdentityPolicy`] which identity the session uses,
//! 2. waits for its slot in the shared [`AutoThrottle`],
//! 3. sends the request with a hard timeout,
//! 4. feeds the latency and outcome back into the throttle, and
//! 5. consults the [`RetryPolicy`] to decide whether to back off and retry.
//!
//! A response with an error status that is not retried (or that is still
//! failing once retries are exhausted) is returned as `Ok`; callers decide
//! what a `404` means for them. Only a request that never produced a
//! response ends in [`FetchError`].
//!
//! The [`StopSignal`] is checked before every attempt and before every
//! backoff sleep, so no request is sent once it has been raised.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::identity::IdentityPolicy;
use crate::pagination::StopSignal;
use crate::retry::RetryPolicy;
use crate::throttle::AutoThrottle;
use crate::transport::{Response, Transport, TransportError};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A fetch that did not produce a usable response.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Every attempt failed without a response, or a non-transient
    /// transport error occurred.
    #[error("fetch of {url} failed after {attempts} attempt(s): {source}")]
    Failed {
        /// The requested URL.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last transport failure.
        #[source]
        source: TransportError,
    },
    /// The stop signal was raised before the next attempt.
    #[error("fetch of {url} cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// The requested URL.
        url: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

impl FetchError {
    /// Number of requests sent before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    const fn cancelled(url: String, attempts: u32) -> Self {
        Self::Cancelled { url, attempts }
    }
}

/// Composes a [`Transport`] with retry, throttle and identity rules.
pub struct FetchPolicy {
    transport: Arc<dyn Transport>,
    identities: Arc<IdentityPolicy>,
    retry: RetryPolicy,
    throttle: Arc<AutoThrottle>,
    timeout: Duration,
}

impl std::fmt::Debug for FetchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPolicy")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl FetchPolicy {
    /// Creates a policy over `transport` with default retries and timeout,
    /// default throttling, and no identity overrides.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            identities: Arc::new(IdentityPolicy::new(Vec::new(), true)),
            retry: RetryPolicy::default(),
            throttle: Arc::new(AutoThrottle::default()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the identity rotation policy.
    #[must_use]
    pub fn with_identities(mut self, identities: Arc<IdentityPolicy>) -> Self {
        self.identities = identities;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the shared throttle.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Arc<AutoThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches `url` on behalf of session `session_key` (the row index).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Failed`] if every attempt failed without a
    /// response or a non-transient transport error occurred, and
    /// [`FetchError::Cancelled`] if `stop` was raised before an attempt or a
    /// retry.
    pub async fn fetch(
        &self,
        url: &str,
        session_key: u64,
        stop: &StopSignal,
    ) -> Result<Response, FetchError> {
        let max = self.retry.max_retries();
        let mut attempt: u32 = 0;

        loop {
            if stop.is_stopped() {
                return Err(FetchError::cancelled(url.to_owned(), attempt));
            }
            let identity = self.identities.identity_for(session_key);
            self.throttle.wait().await;
            if stop.is_stopped() {
                return Err(FetchError::cancelled(url.to_owned(), attempt));
            }

            let started = Instant::now();
            let result = tokio::time::timeout(
                self.timeout,
                self.transport.get(url, identity.as_deref(), self.timeout),
            )
            .await
            .unwrap_or_else(|_| Err(TransportError::timeout(url, self.timeout)));
            let latency = started.elapsed();

            match result {
                Ok(response) => {
                    self.throttle
                        .observe_response(latency, response.is_success());

                    if self.retry.should_retry(attempt, Some(response.status)) {
                        if stop.is_stopped() {
                            log::debug!(
                                "[{session_key}] HTTP {} from {url}, stopped before retry",
                                response.status,
                            );
                            return Err(FetchError::cancelled(url.to_owned(), attempt + 1));
                        }
                        let delay = self.retry.delay_for(attempt);
                        attempt += 1;
                        log::warn!(
                            "[{session_key}] HTTP {} from {url}, retry {attempt}/{max} in {delay:?}",
                            response.status,
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if !response.is_success() && self.retry.is_retryable_status(response.status) {
                        log::warn!(
                            "[{session_key}] HTTP {} from {url}, giving up after {max} retries",
                            response.status,
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    self.throttle.observe_error();

                    if e.is_transient() && self.retry.should_retry(attempt, None) {
                        if stop.is_stopped() {
                            log::debug!("[{session_key}] {e}, stopped before retry");
                            return Err(FetchError::cancelled(url.to_owned(), attempt + 1));
                        }
                        let delay = self.retry.delay_for(attempt);
                        attempt += 1;
                        log::warn!("[{session_key}] {e}, retry {attempt}/{max} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(FetchError::Failed {
                        url: url.to_owned(),
                        attempts: attempt + 1,
                        source: e,
                    });
                }
            }
        }
    }
}
