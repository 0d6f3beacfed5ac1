//! Domain layer - pure types and rules with no I/O.
//!
//! This layer contains the core concepts and invariants of the gateway:
//! - Circuit breaker states and configuration
//! - Sliding-window admission counting
//! - Cache entries and their validity
//! - Reports for the monitoring sink
//! - The error taxonomy
//!
//! All types in this layer are pure and easily testable.

pub mod circuit;
pub mod entry;
pub mod error;
pub mod report;
pub mod window;
