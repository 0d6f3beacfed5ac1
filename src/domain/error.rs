//! Error taxonomy for gated calls, configuration and report delivery.

use crate::domain::circuit::CircuitState;
use std::time::Duration;
use thiserror::Error;

/// Invalid gateway configuration, reported by validating constructors and `build()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Circuit breakers need at least one failure before opening
    #[error("failure_threshold must be greater than 0")]
    ZeroFailureThreshold,
    /// A limiter that admits nothing is a configuration mistake
    #[error("max_requests must be greater than 0")]
    ZeroMaxRequests,
    /// Sliding windows need a non-zero length
    #[error("rate limit window must be greater than 0")]
    ZeroWindow,
    /// The cache bound must allow at least one entry
    #[error("cache max_entries must be greater than 0")]
    ZeroCacheCapacity,
}

/// A call was rejected because its circuit breaker is not accepting traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker is {state} for {operation}")]
pub struct CircuitOpen {
    /// Operation name the breaker guards
    pub operation: String,
    /// State the breaker was in when it rejected the call
    pub state: CircuitState,
    /// Time until the breaker will let a probe through
    pub retry_after: Duration,
}

/// An admission check failed for the given identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit exceeded for {identifier}: max {max_requests} requests per {}ms", window.as_millis())]
pub struct RateLimitExceeded {
    /// Scope that was over its limit (e.g. `user_42` or `global`)
    pub identifier: String,
    /// Configured request ceiling
    pub max_requests: usize,
    /// Configured window length
    pub window: Duration,
}

/// Error returned by gated calls.
///
/// The two synthetic variants never reach the wrapped operation. `Operation`
/// carries the operation's own error unchanged.
#[derive(Debug, Error)]
pub enum GatewayError<E> {
    /// The operation's circuit breaker rejected the call
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),
    /// A rate limit rejected the call
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
    /// The wrapped operation failed
    #[error(transparent)]
    Operation(E),
}

impl<E> GatewayError<E> {
    /// True when the breaker rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, GatewayError::CircuitOpen(_))
    }

    /// True when a rate limit rejected the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited(_))
    }

    /// The operation's own error, if the operation ran and failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            GatewayError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// A reporter could not accept a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// The sink has been shut down
    #[error("report sink is closed")]
    Closed,
    /// The sink is at capacity
    #[error("report sink is full")]
    Full,
    /// Sink-specific failure
    #[error("report sink failed: {0}")]
    Sink(String),
}
