//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::error::ReportError;
use crate::domain::report::Report;
use std::fmt::Debug;
use std::time::Instant;

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for the error and telemetry sink.
///
/// Implementations must not block: the gateway calls `report` inline on the
/// caller's task. Returning an error is fine; the gateway logs it and moves on.
pub trait Reporter: Send + Sync + Debug {
    /// Hand a report to the sink.
    fn report(&self, report: Report) -> Result<(), ReportError>;
}

/// Deliver a report, logging instead of propagating delivery failures.
pub(crate) fn submit(reporter: &dyn Reporter, report: Report) {
    let kind = report.kind();
    if let Err(e) = reporter.report(report) {
        tracing::warn!(kind, error = %e, "Failed to deliver report");
    }
}
