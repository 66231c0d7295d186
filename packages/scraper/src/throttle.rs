//! Adaptive request throttling shared by every worker in a run.
//!
//! [`AutoThrottle`] keeps a single delay that spaces out the *start* of
//! consecutive requests across all workers. The delay follows the observed
//! latency: each response pulls it toward `latency / target_concurrency`,
//! errors double it, and it never leaves `[min_delay, max_delay]`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Throttle settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// When `false`, [`AutoThrottle::wait`] returns immediately.
    pub enabled: bool,
    /// Delay used before any response has been observed.
    pub start_delay: Duration,
    /// Lower bound for the delay.
    pub min_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
    /// Average number of requests the remote server should be handling
    /// from us at once. Must be positive.
    pub target_concurrency: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_delay: Duration::from_millis(500),
            min_delay: Duration::ZERO,
            max_delay: Duration::from_secs(10),
            target_concurrency: 1.0,
        }
    }
}

impl ThrottleConfig {
    /// A configuration that never delays requests.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            start_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct ThrottleState {
    delay: Duration,
    /// Earliest instant the next request may start.
    next_slot: Option<Instant>,
}

/// Global, latency-driven request spacing.
#[derive(Debug)]
pub struct AutoThrottle {
    config: ThrottleConfig,
    state: Mutex<ThrottleState>,
}

impl Default for AutoThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl AutoThrottle {
    /// Creates a throttle starting at the configured start delay.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        let delay = config.start_delay.clamp(config.min_delay, config.max_delay);
        Self {
            config,
            state: Mutex::new(ThrottleState {
                delay,
                next_slot: None,
            }),
        }
    }

    /// Creates a throttle that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(ThrottleConfig::disabled())
    }

    /// The delay currently applied between request starts.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.lock().delay
    }

    /// Waits for this request's slot. Slots are handed out in call order,
    /// one delay apart.
    pub async fn wait(&self) {
        if !self.config.enabled {
            return;
        }

        let slot = {
            let mut state = self.lock();
            let now = Instant::now();
            let slot = state.next_slot.map_or(now, |next| next.max(now));
            state.next_slot = Some(slot + state.delay);
            slot
        };

        if slot > Instant::now() {
            tokio::time::sleep_until(tokio::time::Instant::from_std(slot)).await;
        }
    }

    /// Feeds a received response into the delay estimate.
    ///
    /// Error statuses never lower the delay; they double it instead.
    pub fn observe_response(&self, latency: Duration, success: bool) {
        if !success {
            self.observe_error();
            return;
        }

        let target = latency.div_f64(self.config.target_concurrency.max(f64::EPSILON));
        let mut state = self.lock();
        let averaged = (state.delay + target) / 2;
        state.delay = averaged
            .max(target)
            .clamp(self.config.min_delay, self.config.max_delay);
        log::trace!("throttle: latency={latency:?} delay={:?}", state.delay);
    }

    /// Records a failed request (timeout, connection error, error status).
    pub fn observe_error(&self) {
        let mut state = self.lock();
        let doubled = state
            .delay
            .saturating_mul(2)
            .max(self.config.start_delay);
        state.delay = doubled.clamp(self.config.min_delay, self.config.max_delay);
        log::trace!("throttle: error, delay={:?}", state.delay);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
