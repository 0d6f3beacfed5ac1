//! Sliding-window rate limiter keyed by identifier.
//!
//! Each identifier (`user_<id>`, `global`, ...) gets its own window, so one
//! caller exhausting its quota never affects another scope. Windows that have
//! gone idle are dropped from the check path at most once per window length.

use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::domain::error::RateLimitExceeded;
use crate::domain::window::{RateLimitConfig, SlidingWindow, WindowDecision};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::ShardedStorage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Identifier used for the limit shared by every caller.
pub const GLOBAL_SCOPE: &str = "global";

/// Identifier for the per-user limit of `user_id`.
pub fn user_scope(user_id: &str) -> String {
    format!("user_{user_id}")
}

/// Remaining quota for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Requests still admissible right now
    pub remaining: usize,
    /// When the oldest in-window request expires, if any are recorded
    pub reset_at: Option<Instant>,
}

/// Rate limiter holding one sliding window per identifier.
#[derive(Debug)]
pub struct RateLimiter {
    windows: ShardedStorage<String, SlidingWindow>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    /// Reference epoch for the last purge timestamp
    epoch: Instant,
    last_purge_nanos: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter using the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemClock::new()), Metrics::new())
    }

    /// Create a limiter with injected collaborators.
    ///
    /// # Arguments
    /// * `config` - Limits applied to every identifier
    /// * `clock` - Time source for window expiry
    /// * `metrics` - Shared metrics; rejections are counted here
    pub fn with_parts(config: RateLimitConfig, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        let epoch = clock.now();
        Self {
            windows: ShardedStorage::new(),
            config,
            clock,
            metrics,
            epoch,
            last_purge_nanos: AtomicU64::new(0),
        }
    }

    /// Admit or reject one request for `identifier`.
    ///
    /// Expired timestamps are dropped first. An admitted request is recorded;
    /// a rejected one is not. Once a full window has passed since the last
    /// sweep, identifiers with empty windows are forgotten before the check.
    ///
    /// # Errors
    /// Returns `RateLimitExceeded` when `max_requests` requests are already in
    /// the window.
    pub fn check_rate_limit(&self, identifier: &str) -> Result<(), RateLimitExceeded> {
        let now = self.clock.now();
        let config = self.config;
        self.purge_if_due(now);

        let decision = self.windows.with_entry_mut(
            identifier.to_string(),
            || SlidingWindow::new(config),
            |window| window.register(now),
        );

        match decision {
            WindowDecision::Admit => Ok(()),
            WindowDecision::Reject => {
                self.metrics.record_rate_limited();
                tracing::warn!(
                    identifier,
                    max_requests = config.max_requests,
                    window_ms = config.window.as_millis() as u64,
                    "Rate limit exceeded"
                );
                Err(RateLimitExceeded {
                    identifier: identifier.to_string(),
                    max_requests: config.max_requests,
                    window: config.window,
                })
            }
        }
    }

    /// Requests still admissible for `identifier` right now.
    pub fn remaining(&self, identifier: &str) -> usize {
        let now = self.clock.now();
        self.windows
            .with_existing_mut(identifier, |window| window.remaining(now))
            .unwrap_or(self.config.max_requests)
    }

    /// When the oldest in-window request for `identifier` expires.
    ///
    /// Returns `None` if nothing is recorded in the window.
    pub fn reset_at(&self, identifier: &str) -> Option<Instant> {
        let now = self.clock.now();
        self.windows
            .with_existing_mut(identifier, |window| {
                window.expire(now);
                window.reset_at()
            })
            .flatten()
    }

    /// Remaining quota and reset time for `identifier`, read under one lock.
    pub fn status(&self, identifier: &str) -> RateLimitStatus {
        let now = self.clock.now();
        self.windows
            .with_existing_mut(identifier, |window| RateLimitStatus {
                remaining: window.remaining(now),
                reset_at: window.reset_at(),
            })
            .unwrap_or(RateLimitStatus {
                remaining: self.config.max_requests,
                reset_at: None,
            })
    }

    /// Forget identifiers whose windows hold no in-window requests.
    ///
    /// Returns the number of identifiers removed.
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now();
        let removed = self.windows.retain(|_, window| {
            window.expire(now);
            !window.is_empty()
        });
        if removed > 0 {
            tracing::debug!(removed, "Purged idle rate limit windows");
        }
        removed
    }

    /// Run `purge_idle` if a full window has passed since the last sweep.
    ///
    /// Only the caller that claims the sweep runs it; concurrent checks skip.
    fn purge_if_due(&self, now: Instant) {
        let elapsed: u64 = now
            .saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        let window: u64 = self.config.window.as_nanos().try_into().unwrap_or(u64::MAX);
        let last = self.last_purge_nanos.load(Ordering::Acquire);

        if elapsed.saturating_sub(last) < window {
            return;
        }

        let claimed = self
            .last_purge_nanos
            .compare_exchange(last, elapsed, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.purge_idle();
        }
    }

    /// Number of identifiers with a window.
    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }

    /// Limits applied to every identifier.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
