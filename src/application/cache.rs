//! TTL read cache for query results.
//!
//! Entries are type-erased so one cache can hold results of different queries.
//! Every access first sweeps expired entries and then enforces the size bound by
//! evicting the oldest entries.

use crate::application::metrics::Metrics;
use crate::application::ports::{submit, Clock, Reporter};
use crate::application::timer::PerformanceTimer;
use crate::domain::entry::CacheEntry;
use crate::domain::report::{ErrorReport, Report};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::reporter::NoopReporter;
use crate::infrastructure::storage::ShardedStorage;
use futures::future::{try_join_all, BoxFuture};
use serde::Serialize;
use std::any::Any;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// TTL used when a query does not specify one.
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Entry bound used when none is configured.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// TTL for cached pages.
pub const PAGE_TTL: Duration = Duration::from_millis(60_000);

/// Slow threshold for a whole batch.
pub const BATCH_THRESHOLD: Duration = Duration::from_millis(5000);

type CachedValue = Arc<dyn Any + Send + Sync>;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_more: bool,
    pub total_count: usize,
}

/// One query of a batch.
pub struct BatchQuery<'a, T, E> {
    name: String,
    cache_key: Option<String>,
    ttl: Option<Duration>,
    query: BoxFuture<'a, Result<T, E>>,
}

impl<'a, T, E> BatchQuery<'a, T, E> {
    /// A query named `name`, uncached unless a key is added.
    pub fn new<Fut>(name: impl Into<String>, query: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'a,
    {
        Self {
            name: name.into(),
            cache_key: None,
            ttl: None,
            query: Box::pin(query),
        }
    }

    /// Cache the result under `key`.
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Cache the result for `ttl` instead of the default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Cache counters and size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
}

/// TTL cache in front of query functions.
#[derive(Debug)]
pub struct QueryCache {
    entries: ShardedStorage<String, CacheEntry<CachedValue>>,
    max_entries: usize,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn Reporter>,
    timer: Arc<PerformanceTimer>,
    metrics: Metrics,
}

impl QueryCache {
    /// Create a cache using the system clock and a no-op reporter.
    pub fn new(max_entries: usize) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let reporter: Arc<dyn Reporter> = Arc::new(NoopReporter);
        let metrics = Metrics::new();
        let timer = Arc::new(PerformanceTimer::with_parts(
            crate::application::timer::DEFAULT_SLOW_THRESHOLD,
            Arc::clone(&clock),
            Arc::clone(&reporter),
            metrics.clone(),
        ));
        Self::with_parts(max_entries, clock, reporter, timer, metrics)
    }

    /// Create a cache with injected collaborators.
    ///
    /// A `max_entries` of zero is treated as one.
    pub fn with_parts(
        max_entries: usize,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn Reporter>,
        timer: Arc<PerformanceTimer>,
        metrics: Metrics,
    ) -> Self {
        Self {
            entries: ShardedStorage::new(),
            max_entries: max_entries.max(1),
            enabled: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            clock,
            reporter,
            timer,
            metrics,
        }
    }

    /// Run a query, serving it from cache when possible.
    ///
    /// With a `cache_key` and caching enabled, a valid entry of type `T` is
    /// returned without calling `query_fn`. Otherwise `query_fn` runs and a
    /// successful result is stored under the key for `ttl` (default
    /// [`DEFAULT_TTL`]). A failure is reported with the query name as context
    /// and returned unchanged.
    pub async fn execute_query<T, E, F, Fut>(
        &self,
        name: &str,
        cache_key: Option<&str>,
        ttl: Option<Duration>,
        query_fn: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: StdError,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.timer.guard(name, None);

        if let Some(hit) = cache_key.and_then(|key| self.lookup::<T>(key)) {
            let elapsed = guard.finish();
            log_query(name, elapsed, true);
            return Ok(hit);
        }

        let result = query_fn().await;
        let elapsed = guard.finish();
        log_query(name, elapsed, false);

        match result {
            Ok(value) => {
                if let Some(key) = cache_key {
                    self.store(key, value.clone(), ttl.unwrap_or(DEFAULT_TTL));
                }
                Ok(value)
            }
            Err(e) => {
                submit(
                    self.reporter.as_ref(),
                    Report::Error(
                        ErrorReport::from_error(&e)
                            .with_context("query_name", name)
                            .with_context("operation", "database_query"),
                    ),
                );
                Err(e)
            }
        }
    }

    /// Run several queries concurrently.
    ///
    /// Results come back in input order. The first failure fails the batch.
    pub async fn batch_query<'a, T, E>(&self, queries: Vec<BatchQuery<'a, T, E>>) -> Result<Vec<T>, E>
    where
        T: Clone + Send + Sync + 'static,
        E: StdError,
    {
        let guard = self.timer.guard("batch_query", Some(BATCH_THRESHOLD));

        let pending = queries.into_iter().map(|q| async move {
            let BatchQuery {
                name,
                cache_key,
                ttl,
                query,
            } = q;
            self.execute_query(&name, cache_key.as_deref(), ttl, move || query)
                .await
        });
        let result = try_join_all(pending).await;

        guard.finish();
        result
    }

    /// Fetch one page, caching it for [`PAGE_TTL`].
    ///
    /// # Arguments
    /// * `name` - Query name; the page is cached as `<name>_page_<page>_size_<size>`
    /// * `page` - Page number, passed through to `fetch`
    /// * `page_size` - Page size, passed through to `fetch`
    /// * `fetch` - Loads the page on a miss
    pub async fn paginated_query<T, E, F, Fut>(
        &self,
        name: &str,
        page: usize,
        page_size: usize,
        fetch: F,
    ) -> Result<Page<T>, E>
    where
        T: Clone + Send + Sync + 'static,
        E: StdError,
        F: FnOnce(usize, usize) -> Fut,
        Fut: Future<Output = Result<Page<T>, E>>,
    {
        let key = format!("{name}_page_{page}_size_{page_size}");
        let operation = format!("{name}_paginated");
        self.execute_query(&operation, Some(&key), Some(PAGE_TTL), || {
            fetch(page, page_size)
        })
        .await
    }

    /// Valid cached value of type `T` under `key`.
    ///
    /// A value stored with a different type counts as a miss.
    pub fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !self.is_enabled() {
            return None;
        }

        let now = self.clock.now();
        self.maintain(now);

        let hit = self
            .entries
            .get_cloned(key)
            .filter(|entry| entry.is_valid(now))
            .and_then(|entry| entry.data.downcast_ref::<T>().cloned());

        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_cache_hit();
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_cache_miss();
        }
        hit
    }

    /// Store `value` under `key` for `ttl`. Does nothing while disabled.
    pub fn store<T>(&self, key: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        if !self.is_enabled() {
            return;
        }

        let now = self.clock.now();
        let data: CachedValue = Arc::new(value);
        self.entries
            .insert(key.to_string(), CacheEntry::new(data, now, ttl));
        self.maintain(now);
    }

    /// Turn caching on or off. Turning it off drops every entry.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.entries.clear();
        }
    }

    /// Check if caching is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Remove entries whose key contains `pattern`, or every entry for `None`.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        match pattern {
            Some(pattern) => self.entries.retain(|key, _| !key.contains(pattern)),
            None => {
                let removed = self.entries.len();
                self.entries.clear();
                removed
            }
        }
    }

    /// Number of stored entries, expired ones included until the next access.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured entry bound.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Current size and counters.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits.saturating_add(misses);
        CacheStats {
            size: self.entries.len(),
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Sweep expired entries, then trim to the size bound, oldest first.
    fn maintain(&self, now: Instant) {
        let expired = self.entries.retain(|_, entry| entry.is_valid(now));

        let mut trimmed = 0;
        let len = self.entries.len();
        if len > self.max_entries {
            let excess = len - self.max_entries;
            let count = (self.max_entries / 5).max(excess).max(1);

            let mut by_age = Vec::with_capacity(len);
            self.entries
                .for_each(|key, entry| by_age.push((entry.created_at, key.clone())));
            by_age.sort();

            for (_, key) in by_age.into_iter().take(count) {
                if self.entries.remove(&key).is_some() {
                    trimmed += 1;
                }
            }
        }

        let removed = expired + trimmed;
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            self.metrics.record_cache_evictions(removed);
            tracing::debug!(expired, trimmed, size = self.entries.len(), "Cache entries evicted");
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

pub(crate) fn log_query(name: &str, elapsed: Option<Duration>, cache_hit: bool) {
    tracing::debug!(
        query = name,
        elapsed_ms = elapsed.map_or(0, |d| d.as_millis() as u64),
        cache_hit,
        "Query executed"
    );
}
