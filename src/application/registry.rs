//! Registry of circuit breakers, one per operation name.
//!
//! Breakers are created lazily on first use with the registry's configuration.
//! Every failed or rejected call is reported to the sink as an API error.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::metrics::Metrics;
use crate::application::ports::{submit, Clock, Reporter};
use crate::domain::circuit::{CircuitBreakerConfig, CircuitState};
use crate::domain::error::GatewayError;
use crate::domain::report::{ApiErrorReport, Report};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::reporter::NoopReporter;
use crate::infrastructure::storage::ShardedStorage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failures: u64,
}

/// Named circuit breakers sharing one configuration.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: ShardedStorage<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn Reporter>,
    metrics: Metrics,
}

impl BreakerRegistry {
    /// Create a registry using the system clock and a no-op reporter.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(SystemClock::new()),
            Arc::new(NoopReporter),
            Metrics::new(),
        )
    }

    /// Create a registry with injected collaborators.
    pub fn with_parts(
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn Reporter>,
        metrics: Metrics,
    ) -> Self {
        Self {
            breakers: ShardedStorage::new(),
            config,
            clock,
            reporter,
            metrics,
        }
    }

    /// Get the breaker for `name`, creating it if needed.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get_cloned(name) {
            return breaker;
        }

        self.breakers.with_entry_mut(
            name.to_string(),
            || {
                Arc::new(CircuitBreaker::new(
                    name,
                    self.config.clone(),
                    Arc::clone(&self.clock),
                ))
            },
            |breaker| Arc::clone(breaker),
        )
    }

    /// Get the breaker for `name` without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get_cloned(name)
    }

    /// Run `operation` through the breaker for `name`.
    ///
    /// The operation is invoked at most once and never retried. Rejections and
    /// failures are reported as API errors carrying the breaker state.
    ///
    /// # Errors
    /// `GatewayError::CircuitOpen` when the breaker rejects the call, otherwise
    /// `GatewayError::Operation` with the operation's own error.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, GatewayError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let breaker = self.breaker(name);

        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => {
                self.metrics.record_short_circuit();
                self.report(name, rejection.to_string(), rejection.state);
                return Err(rejection.into());
            }
        };

        match operation().await {
            Ok(value) => {
                permit.succeed();
                self.metrics.record_success();
                Ok(value)
            }
            Err(e) => {
                let state = permit.fail();
                self.metrics.record_failure();
                self.report(name, e.to_string(), state);
                Err(GatewayError::Operation(e))
            }
        }
    }

    /// State and failure count of every breaker created so far.
    pub fn status(&self) -> BTreeMap<String, BreakerStatus> {
        let mut status = BTreeMap::new();
        self.breakers.for_each(|name, breaker| {
            status.insert(
                name.clone(),
                BreakerStatus {
                    state: breaker.state(),
                    failures: breaker.consecutive_failures(),
                },
            );
        });
        status
    }

    /// Close the breaker for `name`. Returns false if no such breaker exists.
    pub fn reset(&self, name: &str) -> bool {
        match self.breakers.get_cloned(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Close every breaker.
    pub fn reset_all(&self) {
        self.breakers.for_each(|_, breaker| breaker.reset());
    }

    /// Number of breakers created so far.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Check if no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Configuration given to new breakers.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn report(&self, name: &str, error: String, circuit_state: CircuitState) {
        submit(
            self.reporter.as_ref(),
            Report::ApiError(ApiErrorReport {
                operation_name: name.to_string(),
                error,
                circuit_state,
            }),
        );
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
