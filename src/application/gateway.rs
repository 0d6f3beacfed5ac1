//! The gateway: rate limits, cache, circuit breakers and timing around one call.
//!
//! A call passes through, in order:
//!
//! 1. the per-user rate limit (`user_<id>`), when the caller is known
//! 2. the global rate limit
//! 3. the cache, when a cache key is given
//! 4. the circuit breaker for the operation name
//! 5. the performance timer, which wraps the breaker call
//!
//! Rejections at any step return before the operation runs.

use crate::application::cache::{log_query, CacheStats, QueryCache};
use crate::application::config::GatewayConfig;
use crate::application::limiter::{user_scope, RateLimitStatus, RateLimiter, GLOBAL_SCOPE};
use crate::application::metrics::{Metrics, MetricsSnapshot};
use crate::application::ports::{Clock, Reporter};
use crate::application::registry::{BreakerRegistry, BreakerStatus};
use crate::application::timer::PerformanceTimer;
use crate::domain::circuit::CircuitBreakerConfig;
use crate::domain::error::{ConfigError, GatewayError, RateLimitExceeded};
use crate::domain::window::RateLimitConfig;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::reporter::NoopReporter;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Per-call settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Caller identity for the per-user rate limit
    pub user_id: Option<String>,
    /// Cache the result under this key
    pub cache_key: Option<String>,
    /// Cache TTL override
    pub ttl: Option<Duration>,
}

impl CallOptions {
    /// No user, no caching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the per-user limit for `user_id`.
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Cache the result under `key`.
    pub fn cached(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Cache for `ttl` instead of the configured default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Kind of table access, used to derive operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableOperation {
    Select,
    Insert,
    Update,
}

impl TableOperation {
    /// Operation name for this access on `table`, e.g. `staff_select`.
    pub fn operation_name(self, table: &str) -> String {
        format!("{table}_{self}")
    }
}

impl fmt::Display for TableOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableOperation::Select => "select",
            TableOperation::Insert => "insert",
            TableOperation::Update => "update",
        })
    }
}

/// Snapshot of every component.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayStatus {
    pub breakers: BTreeMap<String, BreakerStatus>,
    pub global_rate_limit: RateLimitStatus,
    pub cache: CacheStats,
    pub metrics: MetricsSnapshot,
}

/// Resilience gateway for outbound async calls.
///
/// Cloning is cheap; clones share every breaker, window and cache entry.
#[derive(Debug, Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

#[derive(Debug)]
struct GatewayInner {
    registry: BreakerRegistry,
    limiter: RateLimiter,
    cache: QueryCache,
    timer: Arc<PerformanceTimer>,
    metrics: Metrics,
    cache_ttl: Duration,
}

impl Gateway {
    /// Create a gateway with default settings, the system clock and no reporting.
    pub fn new() -> Self {
        GatewayBuilder::default().assemble(
            CircuitBreakerConfig::default(),
            RateLimitConfig::default(),
        )
    }

    /// Start building a gateway.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Run `operation` under `name` with rate limiting, circuit breaking and timing.
    ///
    /// # Errors
    /// - `GatewayError::RateLimited` if the global limit is exhausted
    /// - `GatewayError::CircuitOpen` if the breaker for `name` rejects the call
    /// - `GatewayError::Operation` if the operation itself fails
    pub async fn execute<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, GatewayError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError,
    {
        self.guarded(name, None, operation).await
    }

    /// Run `operation` with per-call options.
    ///
    /// A valid cached value short-circuits everything after the rate checks. A
    /// successful result is cached when `options.cache_key` is set.
    ///
    /// # Errors
    /// Same as [`execute`](Gateway::execute), plus `GatewayError::RateLimited`
    /// for the per-user limit.
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        name: &str,
        options: CallOptions,
        operation: F,
    ) -> Result<T, GatewayError<E>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError,
    {
        let CallOptions {
            user_id,
            cache_key,
            ttl,
        } = options;

        let Some(key) = cache_key else {
            return self.guarded(name, user_id.as_deref(), operation).await;
        };

        self.check_limits(user_id.as_deref())?;
        let inner = &self.inner;

        let lookup = inner.timer.guard(name, None);
        if let Some(hit) = inner.cache.lookup::<T>(&key) {
            let elapsed = lookup.finish();
            log_query(name, elapsed, true);
            return Ok(hit);
        }
        // A miss is timed by the breaker call below
        drop(lookup);

        let value = self.run(name, operation).await?;
        inner
            .cache
            .store(&key, value.clone(), ttl.unwrap_or(inner.cache_ttl));
        Ok(value)
    }

    /// Run a table access named `<table>_<operation>`.
    pub async fn execute_on_table<T, E, F, Fut>(
        &self,
        table: &str,
        access: TableOperation,
        options: CallOptions,
        operation: F,
    ) -> Result<T, GatewayError<E>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError,
    {
        let name = access.operation_name(table);
        self.execute_with(&name, options, operation).await
    }

    /// Status of every breaker, the global limit, the cache and the counters.
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            breakers: self.inner.registry.status(),
            global_rate_limit: self.inner.limiter.status(GLOBAL_SCOPE),
            cache: self.inner.cache.stats(),
            metrics: self.inner.metrics.snapshot(),
        }
    }

    /// The breaker registry.
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.inner.registry
    }

    /// The rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// The query cache.
    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// The performance timer.
    pub fn timer(&self) -> &PerformanceTimer {
        &self.inner.timer
    }

    /// Shared counters.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    async fn guarded<T, E, F, Fut>(
        &self,
        name: &str,
        user_id: Option<&str>,
        operation: F,
    ) -> Result<T, GatewayError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError,
    {
        self.check_limits(user_id)?;
        self.run(name, operation).await
    }

    fn check_limits(&self, user_id: Option<&str>) -> Result<(), RateLimitExceeded> {
        if let Some(user) = user_id {
            self.inner.limiter.check_rate_limit(&user_scope(user))?;
        }
        self.inner.limiter.check_rate_limit(GLOBAL_SCOPE)
    }

    async fn run<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, GatewayError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError,
    {
        let guard = self.inner.timer.guard(name, None);
        let result = self.inner.registry.execute(name, operation).await;
        guard.finish();
        result
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing a `Gateway`.
///
/// Settings accumulate in a [`GatewayConfig`] and are validated when `build()`
/// is called. Durations are kept at millisecond precision.
#[derive(Debug, Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    clock: Option<Arc<dyn Clock>>,
    reporter: Option<Arc<dyn Reporter>>,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

impl GatewayBuilder {
    /// Take every setting from a loaded configuration.
    pub fn with_config(mut self, config: &GatewayConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Send reports to `reporter` instead of dropping them.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Set the configuration given to every breaker.
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.failure_threshold = config.failure_threshold;
        self.config.reset_timeout_ms = millis(config.reset_timeout);
        self.config.monitoring_period_ms = millis(config.monitoring_period);
        self
    }

    /// Set the limit applied to every rate limit identifier.
    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.config.max_requests = max_requests;
        self.config.window_ms = millis(window);
        self
    }

    /// Set the cache entry bound.
    pub fn with_cache_capacity(mut self, max_entries: usize) -> Self {
        self.config.cache_max_entries = max_entries;
        self
    }

    /// Start with caching on or off.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    /// Set the default cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl_ms = millis(ttl);
        self
    }

    /// Set the default slow-operation threshold.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.config.slow_threshold_ms = millis(threshold);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    /// Returns `ConfigError` if any setting is invalid.
    pub fn build(self) -> Result<Gateway, ConfigError> {
        self.config.validate()?;
        let breaker_config = self.config.breaker_config()?;
        let rate_limit = self.config.rate_limit_config()?;
        Ok(self.assemble(breaker_config, rate_limit))
    }

    fn assemble(self, breaker_config: CircuitBreakerConfig, rate_limit: RateLimitConfig) -> Gateway {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let reporter = self.reporter.unwrap_or_else(|| Arc::new(NoopReporter));
        let metrics = Metrics::new();

        let timer = Arc::new(PerformanceTimer::with_parts(
            self.config.slow_threshold(),
            Arc::clone(&clock),
            Arc::clone(&reporter),
            metrics.clone(),
        ));
        let registry = BreakerRegistry::with_parts(
            breaker_config,
            Arc::clone(&clock),
            Arc::clone(&reporter),
            metrics.clone(),
        );
        let limiter = RateLimiter::with_parts(rate_limit, Arc::clone(&clock), metrics.clone());
        let cache = QueryCache::with_parts(
            self.config.cache_max_entries,
            clock,
            reporter,
            Arc::clone(&timer),
            metrics.clone(),
        );
        cache.set_enabled(self.config.cache_enabled);

        Gateway {
            inner: Arc::new(GatewayInner {
                registry,
                limiter,
                cache,
                timer,
                metrics,
                cache_ttl: self.config.cache_ttl(),
            }),
        }
    }
}
