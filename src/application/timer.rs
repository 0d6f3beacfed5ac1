//! Latency measurement with slow-operation reporting.
//!
//! A timer records its start instant and threshold. Ending it yields the elapsed
//! time and, when that exceeds the threshold, sends a performance report.

use crate::application::metrics::Metrics;
use crate::application::ports::{submit, Clock, Reporter};
use crate::domain::report::{ErrorReport, PerformanceReport, Report};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::reporter::NoopReporter;
use crate::infrastructure::storage::ShardedStorage;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Threshold used when the caller does not pick one.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(2000);

/// Handle to a running timer.
///
/// Two timers started with the same name get different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerId {
    name: String,
    seq: u64,
}

impl TimerId {
    /// Name the timer was started with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.seq)
    }
}

#[derive(Debug, Clone, Copy)]
struct RunningTimer {
    started_at: Instant,
    threshold: Duration,
}

/// Tracks running timers and reports slow ones.
#[derive(Debug)]
pub struct PerformanceTimer {
    timers: ShardedStorage<TimerId, RunningTimer>,
    next_seq: AtomicU64,
    default_threshold: Duration,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn Reporter>,
    metrics: Metrics,
}

impl PerformanceTimer {
    /// Create a timer using the system clock and a no-op reporter.
    pub fn new() -> Self {
        Self::with_parts(
            DEFAULT_SLOW_THRESHOLD,
            Arc::new(SystemClock::new()),
            Arc::new(NoopReporter),
            Metrics::new(),
        )
    }

    /// Create a timer with injected collaborators.
    pub fn with_parts(
        default_threshold: Duration,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn Reporter>,
        metrics: Metrics,
    ) -> Self {
        Self {
            timers: ShardedStorage::new(),
            next_seq: AtomicU64::new(0),
            default_threshold,
            clock,
            reporter,
            metrics,
        }
    }

    /// Threshold applied when `start_timer` gets `None`.
    pub fn default_threshold(&self) -> Duration {
        self.default_threshold
    }

    /// Start a timer named `name`.
    pub fn start_timer(&self, name: &str, threshold: Option<Duration>) -> TimerId {
        let id = TimerId {
            name: name.to_string(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.timers.insert(
            id.clone(),
            RunningTimer {
                started_at: self.clock.now(),
                threshold: threshold.unwrap_or(self.default_threshold),
            },
        );
        id
    }

    /// Stop a timer and return its elapsed time.
    ///
    /// When the elapsed time exceeds the threshold a performance report is sent.
    /// Returns `None` for an unknown or already ended id.
    pub fn end_timer(&self, id: &TimerId) -> Option<Duration> {
        let timer = self.timers.remove(id)?;
        let elapsed = self.clock.now().saturating_duration_since(timer.started_at);

        if elapsed > timer.threshold {
            self.metrics.record_slow_operation();
            tracing::warn!(
                metric = %id.name,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = timer.threshold.as_millis() as u64,
                "Slow operation"
            );
            submit(
                self.reporter.as_ref(),
                Report::PerformanceIssue(PerformanceReport::new(
                    id.name.clone(),
                    elapsed,
                    timer.threshold,
                )),
            );
        }

        Some(elapsed)
    }

    /// Discard a timer without reporting. Returns false for an unknown id.
    pub fn cancel_timer(&self, id: &TimerId) -> bool {
        self.timers.remove(id).is_some()
    }

    /// Number of timers started and not yet ended.
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    /// Time an async operation.
    ///
    /// The timer is always ended once the operation settles. An error is sent to
    /// the sink with the operation name as context and returned unchanged. If
    /// the future is dropped first, the timer is discarded.
    pub async fn measure_async<T, E, F, Fut>(
        &self,
        name: &str,
        threshold: Option<Duration>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError,
    {
        let guard = self.guard(name, threshold);
        let result = operation().await;
        guard.finish();
        result.map_err(|e| self.report_error(name, e))
    }

    /// Time a synchronous operation, with the same reporting as `measure_async`.
    pub fn measure_sync<T, E, F>(&self, name: &str, threshold: Option<Duration>, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: StdError,
    {
        let guard = self.guard(name, threshold);
        let result = operation();
        guard.finish();
        result.map_err(|e| self.report_error(name, e))
    }

    pub(crate) fn guard(&self, name: &str, threshold: Option<Duration>) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            id: Some(self.start_timer(name, threshold)),
        }
    }

    fn report_error<E: StdError>(&self, name: &str, error: E) -> E {
        submit(
            self.reporter.as_ref(),
            Report::Error(ErrorReport::from_error(&error).with_context("operation", name)),
        );
        error
    }
}

impl Default for PerformanceTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Ends its timer when finished, discards it when dropped unfinished.
pub(crate) struct TimerGuard<'a> {
    timer: &'a PerformanceTimer,
    id: Option<TimerId>,
}

impl TimerGuard<'_> {
    pub(crate) fn finish(mut self) -> Option<Duration> {
        self.id.take().and_then(|id| self.timer.end_timer(&id))
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.timer.cancel_timer(&id);
        }
    }
}
