//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an unreliable dependency:
//!     → circuit_breaker.rs (fail fast while open, one trial when half-open)
//!     → the operation itself
//!     → outcome recorded back into the breaker
//! ```
//!
//! `clock.rs` supplies wall time to the breaker, the rate limiter, and the
//! in-memory store.

pub mod circuit_breaker;
pub mod clock;

pub use circuit_breaker::{CircuitBreaker, CircuitError, CircuitSnapshot, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
