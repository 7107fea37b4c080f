//! Resilient Analytics API library

pub mod analytics;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;

pub use config::schema::AppConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, CircuitError, CircuitState};
pub use security::{RateLimitDecision, RateLimiter};
pub use store::{CacheStore, CounterStore, MemoryStore, RedisStore, Store, StoreError};
