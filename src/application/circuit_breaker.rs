//! Circuit breaker guarding a single named operation.
//!
//! Consecutive failures open the circuit; while open, calls fail immediately
//! without reaching the operation. Once the reset timeout has passed, exactly one
//! caller is let through as a probe. A successful probe closes the circuit, a
//! failed one opens it again.

use crate::application::ports::Clock;
use crate::domain::circuit::{CircuitBreakerConfig, CircuitState};
use crate::domain::error::CircuitOpen;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker for one operation name.
///
/// State lives in atomics so a breaker can be shared behind an `Arc` and
/// consulted from any number of tasks without locking.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    last_failure_time_nanos: AtomicU64,
    /// Bumped each time the circuit opens or is reset. Permits issued in an
    /// older generation no longer affect the state.
    generation: AtomicU64,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    /// Reference epoch for timestamp calculations
    epoch: Instant,
}

impl CircuitBreaker {
    /// Create a closed breaker for `name`.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            name: name.into(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_time_nanos: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            config,
            clock,
            epoch,
        }
    }

    /// Operation name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this breaker was created with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get the number of consecutive failures.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Ask to run the operation.
    ///
    /// In `Closed` the call is allowed. In `Open` the call is rejected until
    /// strictly more than `reset_timeout` has passed since the last failure, at
    /// which point the first caller moves the breaker to `HalfOpen` and receives
    /// a probe permit. While a probe is in flight every other caller is rejected.
    ///
    /// A permit issued while `Closed` only counts if the circuit has not opened
    /// since; a call that finishes after the circuit opened is ignored.
    ///
    /// # Errors
    /// Returns `CircuitOpen` when the call must not reach the operation. The
    /// failure count is not changed by a rejection.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CircuitOpen> {
        // Read before the state so an opening in between makes the permit stale
        let generation = self.generation.load(Ordering::Acquire);

        match self.state() {
            CircuitState::Closed => Ok(CallPermit::new(self, false, generation)),
            CircuitState::Open => {
                let elapsed = self
                    .clock
                    .now()
                    .saturating_duration_since(self.last_failure_time());

                if elapsed <= self.config.reset_timeout {
                    return Err(self.rejection(
                        CircuitState::Open,
                        self.config.reset_timeout.saturating_sub(elapsed),
                    ));
                }

                // Only one caller wins the transition and becomes the probe
                if self.transition(CircuitState::Open, CircuitState::HalfOpen) {
                    tracing::debug!(operation = %self.name, "Circuit breaker half-open, probing");
                    Ok(CallPermit::new(self, true, generation))
                } else {
                    Err(self.rejection(self.state(), Duration::ZERO))
                }
            }
            CircuitState::HalfOpen => Err(self.rejection(CircuitState::HalfOpen, Duration::ZERO)),
        }
    }

    /// Record a successful operation against the current state.
    ///
    /// In `HalfOpen` this settles the probe. Calls that hold a [`CallPermit`]
    /// should settle through it instead.
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => self.probe_succeeded(),
            CircuitState::Closed => self.closed_succeeded(self.generation.load(Ordering::Acquire)),
            CircuitState::Open => {}
        }
    }

    /// Record a failed operation against the current state, returning the
    /// state afterwards.
    pub fn record_failure(&self) -> CircuitState {
        match self.state() {
            CircuitState::HalfOpen => self.probe_failed(),
            _ => self.closed_failed(self.generation.load(Ordering::Acquire)),
        }
    }

    /// Reset the circuit breaker to closed state.
    ///
    /// Outstanding permits, including an in-flight probe, no longer count.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    fn closed_succeeded(&self, generation: u64) {
        if self.is_current(generation) && self.state() == CircuitState::Closed {
            self.consecutive_failures.store(0, Ordering::Release);
        }
    }

    fn closed_failed(&self, generation: u64) -> CircuitState {
        if !self.is_current(generation) {
            tracing::debug!(operation = %self.name, "Ignoring failure from before the circuit opened");
            return self.state();
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.stamp_failure();

        if failures >= u64::from(self.config.failure_threshold)
            && self.transition(CircuitState::Closed, CircuitState::Open)
        {
            self.generation.fetch_add(1, Ordering::AcqRel);
            tracing::warn!(operation = %self.name, failures, "Circuit breaker opened");
        }
        self.state()
    }

    fn probe_succeeded(&self) {
        if self.transition(CircuitState::HalfOpen, CircuitState::Closed) {
            self.consecutive_failures.store(0, Ordering::Release);
            tracing::info!(operation = %self.name, "Circuit breaker closed");
        }
    }

    fn probe_failed(&self) -> CircuitState {
        // Stamp first so the reopened circuit waits a full timeout
        self.stamp_failure();

        if self.transition(CircuitState::HalfOpen, CircuitState::Open) {
            self.generation.fetch_add(1, Ordering::AcqRel);
            let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::warn!(operation = %self.name, failures, "Circuit breaker probe failed, reopening");
        }
        self.state()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn stamp_failure(&self) {
        let nanos = self
            .clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_time_nanos.store(nanos, Ordering::Release);
    }

    fn last_failure_time(&self) -> Instant {
        let nanos = self.last_failure_time_nanos.load(Ordering::Acquire);
        self.epoch + Duration::from_nanos(nanos)
    }

    fn rejection(&self, state: CircuitState, retry_after: Duration) -> CircuitOpen {
        CircuitOpen {
            operation: self.name.clone(),
            state,
            retry_after,
        }
    }

    /// A probe was abandoned before it settled; let the next caller probe.
    fn abandon_probe(&self) {
        if self.transition(CircuitState::HalfOpen, CircuitState::Open) {
            tracing::debug!(operation = %self.name, "Circuit breaker probe dropped");
        }
    }
}

/// Permission to run one call through a breaker.
///
/// Settle it with [`succeed`](CallPermit::succeed) or [`fail`](CallPermit::fail).
/// Only the probe permit decides a half-open circuit; a permit issued before
/// the circuit last opened settles as a no-op. Dropping an unsettled probe
/// permit returns the breaker from `HalfOpen` to `Open` without counting a
/// failure.
#[derive(Debug)]
#[must_use = "a permit must be settled with succeed() or fail()"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    generation: u64,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool, generation: u64) -> Self {
        Self {
            breaker,
            probe,
            generation,
            settled: false,
        }
    }

    /// True if this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// The call succeeded.
    pub fn succeed(mut self) {
        self.settled = true;
        if self.probe {
            if self.breaker.is_current(self.generation) {
                self.breaker.probe_succeeded();
            }
        } else {
            self.breaker.closed_succeeded(self.generation);
        }
    }

    /// The call failed; returns the breaker state after the failure.
    pub fn fail(mut self) -> CircuitState {
        self.settled = true;
        if self.probe {
            if self.breaker.is_current(self.generation) {
                self.breaker.probe_failed()
            } else {
                self.breaker.state()
            }
        } else {
            self.breaker.closed_failed(self.generation)
        }
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled && self.breaker.is_current(self.generation) {
            self.breaker.abandon_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;

    fn breaker(threshold: u32, reset_ms: u64) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::starting_now();
        let config = CircuitBreakerConfig::new(
            threshold,
            Duration::from_millis(reset_ms),
            Duration::from_secs(10),
        )
        .unwrap();
        (
            CircuitBreaker::new("appointments_select", config, Arc::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn test_initial_state() {
        let (cb, _) = breaker(5, 60_000);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.name(), "appointments_select");

        let permit = cb.try_acquire().unwrap();
        assert!(!permit.is_probe());
        permit.succeed();
    }

    #[test]
    fn test_failure_threshold() {
        let (cb, _) = breaker(3, 1000);

        assert_eq!(cb.record_failure(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);

        assert_eq!(cb.record_failure(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 2);

        assert_eq!(cb.record_failure(), CircuitState::Open);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 3);
    }

    #[test]
    fn test_success_resets_failures() {
        let (cb, _) = breaker(3, 1000);

        cb.record_failure();
        cb.record_failure();
        cb.record_success();

        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_without_counting() {
        let (cb, clock) = breaker(2, 1000);
        cb.record_failure();
        cb.record_failure();

        clock.advance_ms(400);
        let err = cb.try_acquire().unwrap_err();
        assert_eq!(err.state, CircuitState::Open);
        assert_eq!(err.operation, "appointments_select");
        assert_eq!(err.retry_after, Duration::from_millis(600));
        assert_eq!(cb.consecutive_failures(), 2);
    }

    #[test]
    fn test_reset_timeout_is_exclusive() {
        let (cb, clock) = breaker(1, 1000);
        cb.record_failure();

        clock.advance_ms(1000);
        assert!(cb.try_acquire().is_err());

        clock.advance_ms(1);
        let permit = cb.try_acquire().unwrap();
        assert!(permit.is_probe());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        permit.succeed();
    }

    #[test]
    fn test_successful_probe_closes() {
        let (cb, clock) = breaker(2, 1000);
        cb.record_failure();
        cb.record_failure();
        clock.advance_ms(1001);

        cb.try_acquire().unwrap().succeed();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let (cb, clock) = breaker(2, 1000);
        cb.record_failure();
        cb.record_failure();
        clock.advance_ms(1001);

        let state = cb.try_acquire().unwrap().fail();

        assert_eq!(state, CircuitState::Open);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 3);

        // The reopened circuit waits a full timeout again
        clock.advance_ms(500);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_single_probe_in_flight() {
        let (cb, clock) = breaker(1, 1000);
        cb.record_failure();
        clock.advance_ms(1001);

        let probe = cb.try_acquire().unwrap();
        let err = cb.try_acquire().unwrap_err();
        assert_eq!(err.state, CircuitState::HalfOpen);
        assert_eq!(err.retry_after, Duration::ZERO);

        probe.succeed();
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_dropped_probe_reopens() {
        let (cb, clock) = breaker(1, 1000);
        cb.record_failure();
        clock.advance_ms(1001);

        drop(cb.try_acquire().unwrap());

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 1);
        // Last failure time is unchanged, so the next caller can probe immediately
        assert!(cb.try_acquire().unwrap().is_probe());
    }

    #[test]
    fn test_dropped_closed_permit_is_noop() {
        let (cb, _) = breaker(1, 1000);
        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_reset() {
        let (cb, _) = breaker(1, 1000);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_late_failure_does_not_decide_probe() {
        let (cb, clock) = breaker(2, 1000);
        let late = cb.try_acquire().unwrap();
        cb.record_failure();
        cb.record_failure();
        clock.advance_ms(1001);

        let probe = cb.try_acquire().unwrap();
        assert!(probe.is_probe());

        // Admitted while closed, finishes while the probe is in flight
        assert_eq!(late.fail(), CircuitState::HalfOpen);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.consecutive_failures(), 2);

        probe.succeed();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_late_success_does_not_decide_probe() {
        let (cb, clock) = breaker(2, 1000);
        let late = cb.try_acquire().unwrap();
        cb.record_failure();
        cb.record_failure();
        clock.advance_ms(1001);

        let probe = cb.try_acquire().unwrap();
        late.succeed();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert_eq!(probe.fail(), CircuitState::Open);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 3);
    }

    #[test]
    fn test_late_result_after_probe_closed_is_ignored() {
        let (cb, clock) = breaker(1, 1000);
        let late = cb.try_acquire().unwrap();
        cb.record_failure();
        clock.advance_ms(1001);

        cb.try_acquire().unwrap().succeed();
        assert_eq!(cb.state(), CircuitState::Closed);

        assert_eq!(late.fail(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_reset_during_probe() {
        let (cb, clock) = breaker(1, 1000);
        cb.record_failure();
        clock.advance_ms(1001);

        let probe = cb.try_acquire().unwrap();
        cb.reset();

        assert_eq!(probe.fail(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_concurrent_probe_race() {
        use std::sync::atomic::AtomicUsize;
        use std::thread;

        let (cb, clock) = breaker(1, 1000);
        cb.record_failure();
        clock.advance_ms(1001);

        let cb = Arc::new(cb);
        let probes = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let cb = Arc::clone(&cb);
            let probes = Arc::clone(&probes);
            handles.push(thread::spawn(move || {
                if let Ok(permit) = cb.try_acquire() {
                    probes.fetch_add(1, Ordering::SeqCst);
                    // Hold the permit: settling it would let another thread in
                    std::mem::forget(permit);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(probes.load(Ordering::SeqCst), 1);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_open_logs_warning() {
        use crate::infrastructure::mocks::MockCaptureLayer;
        use tracing::Level;
        use tracing_subscriber::layer::SubscriberExt;

        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let (cb, _) = breaker(1, 1000);

        tracing::subscriber::with_default(subscriber, || {
            cb.record_failure();
        });

        let events = capture.with_message("Circuit breaker opened");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::WARN);
        assert_eq!(events[0].field("operation"), Some("appointments_select"));
        assert_eq!(events[0].field("failures"), Some("1"));
    }
}
