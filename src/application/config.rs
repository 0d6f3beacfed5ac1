//! Deserializable gateway configuration.
//!
//! Durations are given in milliseconds so the struct can be loaded from JSON,
//! TOML or environment-driven config crates without custom adapters. Every
//! field has a default, so a partial document is enough.

use crate::domain::circuit::CircuitBreakerConfig;
use crate::domain::error::ConfigError;
use crate::domain::window::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flat gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Consecutive failures before a breaker opens
    pub failure_threshold: u32,
    /// How long an open breaker waits before probing
    pub reset_timeout_ms: u64,
    /// Informational only
    pub monitoring_period_ms: u64,
    /// Requests admitted per window and identifier
    pub max_requests: usize,
    /// Rate limit window length
    pub window_ms: u64,
    /// Default cache TTL
    pub cache_ttl_ms: u64,
    /// Cache entry bound
    pub cache_max_entries: usize,
    /// Whether caching starts enabled
    pub cache_enabled: bool,
    /// Default slow-operation threshold
    pub slow_threshold_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            monitoring_period_ms: 10_000,
            max_requests: 100,
            window_ms: 60_000,
            cache_ttl_ms: 300_000,
            cache_max_entries: 100,
            cache_enabled: true,
            slow_threshold_ms: 2_000,
        }
    }
}

impl GatewayConfig {
    /// Breaker settings.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroFailureThreshold` for a zero threshold.
    pub fn breaker_config(&self) -> Result<CircuitBreakerConfig, ConfigError> {
        CircuitBreakerConfig::new(
            self.failure_threshold,
            Duration::from_millis(self.reset_timeout_ms),
            Duration::from_millis(self.monitoring_period_ms),
        )
    }

    /// Rate limit settings.
    ///
    /// # Errors
    /// Returns `ConfigError` for zero requests or a zero window.
    pub fn rate_limit_config(&self) -> Result<RateLimitConfig, ConfigError> {
        RateLimitConfig::new(self.max_requests, Duration::from_millis(self.window_ms))
    }

    /// Default cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Default slow-operation threshold.
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }

    /// Check every setting.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.breaker_config()?;
        self.rate_limit_config()?;
        if self.cache_max_entries == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        Ok(())
    }
}
