//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming POST /api/metrics:
//!     → rate_limit.rs (per-IP fixed window in the shared store)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Limits live in the shared store, not in process memory
//! - What happens on store outage is configuration, never an accident

pub mod rate_limit;

pub use rate_limit::{RateLimitDecision, RateLimitError, RateLimiter, RateLimiterState};
