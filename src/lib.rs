//! # call-shield
//!
//! Circuit breaking, sliding-window rate limiting, TTL caching and latency
//! reporting for outbound async calls.
//!
//! A [`Gateway`] sits between application code and a remote data service. Every
//! call is identified by an operation name (for example `staff_select`) and is an
//! arbitrary async closure that can succeed, fail or be slow.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use call_shield::{CallOptions, Gateway, GatewayError};
//! use std::time::Duration;
//!
//! # #[derive(Debug, Clone)] struct Staff;
//! # async fn fetch_staff() -> Result<Vec<Staff>, std::io::Error> { Ok(vec![]) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::builder()
//!     .with_rate_limit(100, Duration::from_secs(60))
//!     .with_slow_threshold(Duration::from_secs(2))
//!     .build()?;
//!
//! let staff = gateway
//!     .execute_with(
//!         "staff_select",
//!         CallOptions::new().for_user("42").cached("staff:all"),
//!         || fetch_staff(),
//!     )
//!     .await;
//!
//! match staff {
//!     Ok(staff) => println!("{} staff members", staff.len()),
//!     Err(GatewayError::RateLimited(e)) => println!("slow down: {e}"),
//!     Err(GatewayError::CircuitOpen(e)) => println!("retry in {:?}", e.retry_after),
//!     Err(GatewayError::Operation(e)) => println!("query failed: {e}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Circuit breakers**: one per operation name, opened after consecutive
//!   failures, probed once after the reset timeout
//! - **Rate limiting**: sliding windows per identifier (`user_<id>` and `global`)
//! - **Query cache**: TTL entries, lazy expiry, oldest-first eviction past the bound
//! - **Performance timer**: slow operations are reported to the sink
//! - **Reporting**: failures, rejections and slow calls go to a pluggable [`Reporter`]
//! - **Metrics**: atomic counters for every gateway decision
//!
//! ## Reporting
//!
//! Reports are written to an injected [`Reporter`]. The default drops them;
//! [`TracingReporter`] turns them into structured `tracing` events and
//! `ChannelReporter` (feature `async`) hands them to a consumer task:
//!
//! ```rust,no_run
//! use call_shield::{Gateway, TracingReporter};
//! use std::sync::Arc;
//!
//! let gateway = Gateway::builder()
//!     .with_reporter(Arc::new(TracingReporter))
//!     .build()
//!     .unwrap();
//! ```
//!
//! Delivery failures are logged at `WARN` and never reach the caller.
//!
//! ## Configuration
//!
//! [`GatewayConfig`] can be deserialized with `serde`; missing fields take
//! their defaults:
//!
//! ```rust,no_run
//! # use call_shield::{Gateway, GatewayConfig};
//! # fn load() -> GatewayConfig { GatewayConfig::default() }
//! let config: GatewayConfig = load();
//! let gateway = Gateway::builder().with_config(&config).build().unwrap();
//! ```
//!
//! | Setting | Default |
//! |---------|---------|
//! | `failure_threshold` | 5 |
//! | `reset_timeout_ms` | 60 000 |
//! | `monitoring_period_ms` | 10 000 |
//! | `max_requests` | 100 |
//! | `window_ms` | 60 000 |
//! | `cache_ttl_ms` | 300 000 |
//! | `cache_max_entries` | 100 |
//! | `slow_threshold_ms` | 2 000 |
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use call_shield::Gateway;
//! # let gateway = Gateway::new();
//! let status = gateway.status();
//! for (operation, breaker) in &status.breakers {
//!     println!("{operation}: {} ({} failures)", breaker.state, breaker.failures);
//! }
//! println!("cache hit rate: {:.2}", status.cache.hit_rate);
//! println!("rejection rate: {:.2}", status.metrics.rejection_rate());
//! ```
//!
//! ## Testing
//!
//! With the `test-helpers` feature, `infrastructure::mocks` provides a
//! `MockClock` for deterministic time, a `RecordingReporter` to assert on
//! reports and a `MockCaptureLayer` to assert on log events.

// Domain layer - pure types and rules
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    circuit::{CircuitBreakerConfig, CircuitState},
    entry::CacheEntry,
    error::{CircuitOpen, ConfigError, GatewayError, RateLimitExceeded, ReportError},
    report::{ApiErrorReport, ErrorReport, PerformanceReport, Report},
    window::{RateLimitConfig, SlidingWindow, WindowDecision},
};

pub use application::{
    cache::{BatchQuery, CacheStats, Page, QueryCache, DEFAULT_TTL},
    circuit_breaker::{CallPermit, CircuitBreaker},
    config::GatewayConfig,
    gateway::{CallOptions, Gateway, GatewayBuilder, GatewayStatus, TableOperation},
    limiter::{RateLimitStatus, RateLimiter, GLOBAL_SCOPE},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, Reporter},
    registry::{BreakerRegistry, BreakerStatus},
    timer::{PerformanceTimer, TimerId, DEFAULT_SLOW_THRESHOLD},
};

pub use infrastructure::{
    clock::SystemClock,
    reporter::{NoopReporter, TracingReporter},
    storage::ShardedStorage,
};

#[cfg(feature = "async")]
pub use infrastructure::reporter::ChannelReporter;
