//! Infrastructure layer - adapters behind the application ports.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Sharded concurrent storage
//! - Reporters for the monitoring sink

pub mod clock;
pub mod reporter;
pub mod storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides a controllable clock, a recording
/// reporter and a log-capturing layer.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// call-shield = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
