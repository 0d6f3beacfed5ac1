//! Observability metrics for the gateway.
//!
//! Counts what the gateway decided for each call so operators can see how much
//! traffic is being shed, served from cache, or failing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking gateway decisions.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Calls that reached the wrapped operation and succeeded
    calls_succeeded: AtomicU64,
    /// Calls that reached the wrapped operation and failed
    calls_failed: AtomicU64,
    /// Calls rejected by a rate limit
    calls_rate_limited: AtomicU64,
    /// Calls rejected by an open circuit
    calls_short_circuited: AtomicU64,
    /// Cache lookups answered from a valid entry
    cache_hits: AtomicU64,
    /// Cache lookups that fell through to the operation
    cache_misses: AtomicU64,
    /// Cache entries removed by expiry or size bound
    cache_evictions: AtomicU64,
    /// Timed operations that exceeded their threshold
    slow_operations: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_success(&self) {
        self.inner.calls_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.inner.calls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.inner.calls_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_short_circuit(&self) {
        self.inner
            .calls_short_circuited
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_evictions(&self, count: usize) {
        if count > 0 {
            self.inner
                .cache_evictions
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_slow_operation(&self) {
        self.inner.slow_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the number of successful operation calls.
    pub fn calls_succeeded(&self) -> u64 {
        self.inner.calls_succeeded.load(Ordering::Relaxed)
    }

    /// Get the number of failed operation calls.
    pub fn calls_failed(&self) -> u64 {
        self.inner.calls_failed.load(Ordering::Relaxed)
    }

    /// Get the number of rate-limited calls.
    pub fn calls_rate_limited(&self) -> u64 {
        self.inner.calls_rate_limited.load(Ordering::Relaxed)
    }

    /// Get the number of calls rejected by an open circuit.
    pub fn calls_short_circuited(&self) -> u64 {
        self.inner.calls_short_circuited.load(Ordering::Relaxed)
    }

    /// Get the number of cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_hits.load(Ordering::Relaxed)
    }

    /// Get the number of cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.inner.cache_misses.load(Ordering::Relaxed)
    }

    /// Get the number of evicted cache entries.
    pub fn cache_evictions(&self) -> u64 {
        self.inner.cache_evictions.load(Ordering::Relaxed)
    }

    /// Get the number of slow operations.
    pub fn slow_operations(&self) -> u64 {
        self.inner.slow_operations.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls_succeeded: self.calls_succeeded(),
            calls_failed: self.calls_failed(),
            calls_rate_limited: self.calls_rate_limited(),
            calls_short_circuited: self.calls_short_circuited(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            cache_evictions: self.cache_evictions(),
            slow_operations: self.slow_operations(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.calls_succeeded,
            &inner.calls_failed,
            &inner.calls_rate_limited,
            &inner.calls_short_circuited,
            &inner.cache_hits,
            &inner.cache_misses,
            &inner.cache_evictions,
            &inner.slow_operations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    pub calls_rate_limited: u64,
    pub calls_short_circuited: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub slow_operations: u64,
}

impl MetricsSnapshot {
    /// Fraction of cache lookups served from cache (0.0 to 1.0).
    ///
    /// Returns 0.0 if no lookups have happened.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits.saturating_add(self.cache_misses);
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Fraction of attempted calls that were shed by a limit or open circuit.
    pub fn rejection_rate(&self) -> f64 {
        let rejected = self
            .calls_rate_limited
            .saturating_add(self.calls_short_circuited);
        let total = rejected
            .saturating_add(self.calls_succeeded)
            .saturating_add(self.calls_failed);
        if total == 0 {
            0.0
        } else {
            rejected as f64 / total as f64
        }
    }
}
