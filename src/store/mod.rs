//! Shared key-value store subsystem.
//!
//! # Data Flow
//! ```text
//! RateLimiter ──▶ CounterStore (increment / set_expiry / remaining_ttl)
//! Summary API ──▶ CacheStore   (get / set_with_ttl)
//!                      │
//!                      ├─▶ redis.rs  (shared across processes)
//!                      └─▶ memory.rs (single process, tests)
//! ```
//!
//! # Design Decisions
//! - `increment` is one atomic store operation, never read-then-write
//! - TTL replies follow Redis conventions: -2 absent, -1 no expiry
//! - Every backend failure surfaces as `StoreError`; callers pick the policy

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

use crate::observability::metrics;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors raised by a store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the command failed.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something the caller cannot use.
    #[error("counter store inconsistent: {0}")]
    Inconsistent(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic counters with expiry (INCR / EXPIRE / TTL).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one to the counter at `key`, creating it at zero first
    /// if absent. Returns the post-increment value.
    async fn increment(&self, key: &str) -> StoreResult<i64>;

    /// Expire `key` after `seconds`. No-op if the key is absent.
    async fn set_expiry(&self, key: &str, seconds: u64) -> StoreResult<()>;

    /// Remaining lifetime of `key` in seconds; -1 without expiry, -2 absent.
    async fn remaining_ttl(&self, key: &str) -> StoreResult<i64>;
}

/// String values with a time-to-live, used for response caching.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Round-trip check used by the health endpoint.
    async fn ping(&self) -> StoreResult<()>;
}

/// A backend serving both roles.
pub trait Store: CounterStore + CacheStore {}

impl<T: CounterStore + CacheStore> Store for T {}

/// Log and count a failed store operation, passing the error through.
pub(crate) fn report(op: &'static str, err: StoreError) -> StoreError {
    tracing::error!(op, error = %err, "Counter store operation failed");
    metrics::record_store_error(op);
    err
}
