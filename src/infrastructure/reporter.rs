//! Reporter adapters for the monitoring sink.
//!
//! - `NoopReporter` drops every report (the default)
//! - `TracingReporter` turns reports into structured `tracing` events
//! - `ChannelReporter` hands reports to a bounded tokio channel for a consumer
//!   task to ship elsewhere (requires the `async` feature)

use crate::application::ports::Reporter;
use crate::domain::error::ReportError;
use crate::domain::report::Report;

/// Reporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&self, _report: Report) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Reporter that logs each report as a structured event.
///
/// Errors and API errors are logged at `ERROR`, performance issues at `WARN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, report: Report) -> Result<(), ReportError> {
        match report {
            Report::Error(r) => {
                tracing::error!(
                    error = %r.error,
                    stack = ?r.stack,
                    context = ?r.context,
                    "Error report"
                );
            }
            Report::ApiError(r) => {
                tracing::error!(
                    operation = %r.operation_name,
                    error = %r.error,
                    circuit_state = %r.circuit_state,
                    "API error report"
                );
            }
            Report::PerformanceIssue(r) => {
                tracing::warn!(
                    metric = %r.metric_name,
                    value_ms = r.value_ms,
                    threshold_ms = r.threshold_ms,
                    "Performance issue"
                );
            }
        }
        Ok(())
    }
}

#[cfg(feature = "async")]
pub use channel::ChannelReporter;

#[cfg(feature = "async")]
mod channel {
    use super::*;
    use tokio::sync::mpsc;

    /// Reporter backed by a bounded tokio channel.
    ///
    /// `report` uses `try_send`, so a slow consumer makes reports fail with
    /// `ReportError::Full` rather than stalling the caller.
    #[derive(Debug, Clone)]
    pub struct ChannelReporter {
        sender: mpsc::Sender<Report>,
    }

    impl ChannelReporter {
        /// Create a reporter and the receiving half for a consumer task.
        pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Report>) {
            let (sender, receiver) = mpsc::channel(capacity.max(1));
            (Self { sender }, receiver)
        }
    }

    impl Reporter for ChannelReporter {
        fn report(&self, report: Report) -> Result<(), ReportError> {
            self.sender.try_send(report).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ReportError::Full,
                mpsc::error::TrySendError::Closed(_) => ReportError::Closed,
            })
        }
    }
}
