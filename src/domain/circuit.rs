//! Circuit breaker states and configuration.

use crate::domain::error::ConfigError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through to the operation
    Closed = 0,
    /// Calls fail fast without reaching the operation
    Open = 1,
    /// A single probe call is testing whether the dependency recovered
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is let through
    pub reset_timeout: Duration,
    /// Reserved for windowed failure counting; currently informational only
    pub monitoring_period: Duration,
}

impl CircuitBreakerConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroFailureThreshold` if `failure_threshold` is zero.
    pub fn new(
        failure_threshold: u32,
        reset_timeout: Duration,
        monitoring_period: Duration,
    ) -> Result<Self, ConfigError> {
        if failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        Ok(Self {
            failure_threshold,
            reset_timeout,
            monitoring_period,
        })
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.monitoring_period, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = CircuitBreakerConfig::new(0, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(result, Err(ConfigError::ZeroFailureThreshold));
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(CircuitState::from(0), CircuitState::Closed);
        assert_eq!(CircuitState::from(1), CircuitState::Open);
        assert_eq!(CircuitState::from(2), CircuitState::HalfOpen);
        // Unknown values fall back to closed
        assert_eq!(CircuitState::from(7), CircuitState::Closed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
