//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Circuit breakers and their registry (failure isolation per operation)
//! - Rate limiter (admission per identifier)
//! - Query cache (TTL results with a size bound)
//! - Performance timer (slow-operation reports)
//! - Gateway (composition of all of the above)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod gateway;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod timer;
