//! Recording reporter for testing.

use crate::application::ports::Reporter;
use crate::domain::error::ReportError;
use crate::domain::report::{ApiErrorReport, ErrorReport, PerformanceReport, Report};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Reporter that keeps every report in memory.
///
/// Clones share the same buffer. `fail_deliveries(true)` makes every
/// subsequent `report` call fail, for exercising the swallow-and-log path.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<Report>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingReporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries fail (reports are not recorded while failing).
    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// All reports received so far.
    pub fn reports(&self) -> Vec<Report> {
        self.lock().clone()
    }

    /// Number of reports received.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Generic error reports only.
    pub fn errors(&self) -> Vec<ErrorReport> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                Report::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// API error reports only.
    pub fn api_errors(&self) -> Vec<ApiErrorReport> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                Report::ApiError(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// Performance reports only.
    pub fn performance_issues(&self) -> Vec<PerformanceReport> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                Report::PerformanceIssue(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Report>> {
        self.reports
            .lock()
            .expect("RecordingReporter mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, report: Report) -> Result<(), ReportError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(ReportError::Sink("recording disabled".to_string()));
        }
        self.lock().push(report);
        Ok(())
    }
}
