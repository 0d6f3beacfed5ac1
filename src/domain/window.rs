//! Sliding-window admission counting.
//!
//! A window keeps the timestamps of admitted requests that are younger than the
//! window length. Rejected attempts are never recorded, so the window never holds
//! more than `max_requests` timestamps.

use crate::domain::error::ConfigError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// The request fits in the window and was recorded
    Admit,
    /// The window is full
    Reject,
}

impl WindowDecision {
    /// Check if this decision is Admit.
    pub fn is_admit(&self) -> bool {
        matches!(self, WindowDecision::Admit)
    }

    /// Check if this decision is Reject.
    pub fn is_reject(&self) -> bool {
        matches!(self, WindowDecision::Reject)
    }
}

/// Limits applied to every window of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per window
    pub max_requests: usize,
    /// Window length
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroMaxRequests` or `ConfigError::ZeroWindow` for zero values.
    pub fn new(max_requests: usize, window: Duration) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            max_requests,
            window,
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_millis(60_000),
        }
    }
}

/// Sliding window of admitted request timestamps.
///
/// # Example
/// ```
/// use call_shield::{RateLimitConfig, SlidingWindow};
/// use std::time::{Duration, Instant};
///
/// let mut window = SlidingWindow::new(RateLimitConfig::new(2, Duration::from_secs(1)).unwrap());
/// let now = Instant::now();
///
/// assert!(window.register(now).is_admit());
/// assert!(window.register(now).is_admit());
/// assert!(window.register(now).is_reject());
///
/// // Once the window has passed, requests are admitted again
/// let later = now + Duration::from_secs(1);
/// assert!(window.register(later).is_admit());
/// ```
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    config: RateLimitConfig,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            timestamps: VecDeque::with_capacity(config.max_requests.min(1024)),
        }
    }

    /// Drop timestamps whose age has reached the window length.
    pub fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.config.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Check a request at `now`, recording it when admitted.
    pub fn register(&mut self, now: Instant) -> WindowDecision {
        self.expire(now);

        if self.timestamps.len() < self.config.max_requests {
            self.timestamps.push_back(now);
            WindowDecision::Admit
        } else {
            WindowDecision::Reject
        }
    }

    /// Requests still admissible at `now`.
    pub fn remaining(&mut self, now: Instant) -> usize {
        self.expire(now);
        self.config.max_requests.saturating_sub(self.timestamps.len())
    }

    /// When the oldest recorded request leaves the window, if any are recorded.
    pub fn reset_at(&self) -> Option<Instant> {
        self.timestamps
            .front()
            .map(|&oldest| oldest + self.config.window)
    }

    /// Number of recorded requests (may include expired ones until the next check).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if no requests are recorded.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The limits this window enforces.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(max: usize, ms: u64) -> SlidingWindow {
        SlidingWindow::new(RateLimitConfig::new(max, Duration::from_millis(ms)).unwrap())
    }

    #[test]
    fn test_admits_up_to_max() {
        let mut w = window(3, 1000);
        let now = Instant::now();

        assert_eq!(w.register(now), WindowDecision::Admit);
        assert_eq!(w.register(now), WindowDecision::Admit);
        assert_eq!(w.register(now), WindowDecision::Admit);
        assert_eq!(w.register(now), WindowDecision::Reject);
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let mut w = window(1, 1000);
        let now = Instant::now();

        assert!(w.register(now).is_admit());
        for i in 1..10 {
            assert!(w.register(now + Duration::from_millis(i)).is_reject());
        }
        assert_eq!(w.len(), 1);

        // Only the admitted request holds the window
        assert!(w.register(now + Duration::from_millis(1000)).is_admit());
    }

    #[test]
    fn test_request_at_window_edge_expires() {
        let mut w = window(1, 1000);
        let now = Instant::now();

        assert!(w.register(now).is_admit());
        assert!(w.register(now + Duration::from_millis(999)).is_reject());
        assert!(w.register(now + Duration::from_millis(1000)).is_admit());
    }

    #[test]
    fn test_partial_expiry() {
        let mut w = window(2, 1000);
        let now = Instant::now();

        assert!(w.register(now).is_admit());
        assert!(w.register(now + Duration::from_millis(600)).is_admit());
        assert!(w.register(now + Duration::from_millis(900)).is_reject());

        // First request leaves the window, second is still inside
        assert!(w.register(now + Duration::from_millis(1100)).is_admit());
        assert!(w.register(now + Duration::from_millis(1200)).is_reject());
    }

    #[test]
    fn test_remaining_and_reset() {
        let mut w = window(5, 1000);
        let now = Instant::now();
        assert_eq!(w.remaining(now), 5);
        assert_eq!(w.reset_at(), None);

        w.register(now);
        w.register(now + Duration::from_millis(100));
        assert_eq!(w.remaining(now + Duration::from_millis(100)), 3);
        assert_eq!(w.reset_at(), Some(now + Duration::from_millis(1000)));

        assert_eq!(w.remaining(now + Duration::from_millis(2000)), 5);
        assert!(w.is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            RateLimitConfig::new(0, Duration::from_secs(1)),
            Err(ConfigError::ZeroMaxRequests)
        );
        assert_eq!(
            RateLimitConfig::new(1, Duration::ZERO),
            Err(ConfigError::ZeroWindow)
        );
        let defaults = RateLimitConfig::default();
        assert_eq!(defaults.max_requests, 100);
        assert_eq!(defaults.window, Duration::from_millis(60_000));
    }

    #[test]
    fn test_never_exceeds_max_in_window() {
        let mut w = window(10, 500);
        let start = Instant::now();
        let mut admitted: Vec<Instant> = Vec::new();

        for step in 0..400u64 {
            let now = start + Duration::from_millis(step * 7);
            if w.register(now).is_admit() {
                admitted.push(now);
            }
            let in_window = admitted
                .iter()
                .filter(|&&t| now.saturating_duration_since(t) < Duration::from_millis(500))
                .count();
            assert!(in_window <= 10);
        }
    }
}
