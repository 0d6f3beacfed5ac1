//! Cached query results.

use std::time::{Duration, Instant};

/// A cached value with its creation time and time-to-live.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value
    pub data: V,
    /// When the value was stored
    pub created_at: Instant,
    /// How long the value stays valid after `created_at`
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Create an entry stored at `created_at`.
    pub fn new(data: V, created_at: Instant, ttl: Duration) -> Self {
        Self {
            data,
            created_at,
            ttl,
        }
    }

    /// An entry is valid while its age is strictly below its TTL.
    pub fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}
