//! Reports sent to the monitoring sink.
//!
//! The gateway only ever writes these; it never reads anything back from the sink.

use crate::domain::circuit::CircuitState;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Duration;

/// A generic error with its cause chain and free-form context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Display text of the top-level error
    pub error: String,
    /// Display text of each `source()` in order, outermost first
    pub stack: Vec<String>,
    /// Context such as the operation or query name
    pub context: BTreeMap<String, String>,
}

impl ErrorReport {
    /// Build a report from an error, walking its source chain.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: StdError + ?Sized,
    {
        let mut stack = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }

        Self {
            error: error.to_string(),
            stack,
            context: BTreeMap::new(),
        }
    }

    /// Add a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// A failed or rejected call through a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorReport {
    /// Operation name the breaker guards
    pub operation_name: String,
    /// Display text of the failure
    pub error: String,
    /// Breaker state after the failure was recorded
    pub circuit_state: CircuitState,
}

/// A timed operation exceeded its latency threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceReport {
    /// Timer name
    pub metric_name: String,
    /// Measured duration in milliseconds
    pub value_ms: u64,
    /// Threshold in milliseconds
    pub threshold_ms: u64,
}

impl PerformanceReport {
    /// Build a report from measured and threshold durations.
    pub fn new(metric_name: impl Into<String>, value: Duration, threshold: Duration) -> Self {
        Self {
            metric_name: metric_name.into(),
            value_ms: saturating_millis(value),
            threshold_ms: saturating_millis(threshold),
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

/// Everything the gateway can send to a reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    /// Generic error
    Error(ErrorReport),
    /// Circuit breaker failure or rejection
    ApiError(ApiErrorReport),
    /// Slow operation
    PerformanceIssue(PerformanceReport),
}

impl Report {
    /// Short name of the report kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Report::Error(_) => "error",
            Report::ApiError(_) => "api_error",
            Report::PerformanceIssue(_) => "performance_issue",
        }
    }
}
