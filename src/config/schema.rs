//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener and request handling.
    pub server: ServerConfig,

    /// Shared key-value store (rate-limit counters, response cache).
    pub store: StoreConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Breaker guarding the external data dependency.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Simulated downstream dependency.
    pub external_service: ExternalServiceConfig,

    /// Response caching.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Service name, reported in logs.
    pub app_name: String,

    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Total time allowed per request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            app_name: "Resilient Analytics API".to_string(),
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Which store implementation backs counters and cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    pub redis_host: String,

    pub redis_port: u16,

    /// Interval between expired-key sweeps for the memory backend.
    pub purge_interval_secs: u64,

    /// Upper bound on establishing a Redis connection.
    pub connect_timeout_ms: u64,

    /// Upper bound on waiting for a reply to one Redis command.
    pub response_timeout_ms: u64,
}

impl StoreConfig {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            purge_interval_secs: 30,
            connect_timeout_ms: 1000,
            response_timeout_ms: 500,
        }
    }
}

/// What the HTTP layer does when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Admit the request.
    FailOpen,
    /// Treat the client as over its limit.
    FailClosed,
    /// Answer 503 without judging the client.
    Reject,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per client per window.
    pub limit: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Behaviour on counter store outage.
    pub on_store_error: StoreFailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 5,
            window_secs: 60,
            on_store_error: StoreFailurePolicy::Reject,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds after the last failure before a trial call is allowed.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 10,
        }
    }
}

/// Simulated external dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExternalServiceConfig {
    /// Probability in [0, 1] that a call fails.
    pub failure_rate: f64,

    /// Simulated network latency in milliseconds.
    pub latency_ms: u64,
}

impl Default for ExternalServiceConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.1,
            latency_ms: 100,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of cached metric summaries, in seconds.
    pub summary_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            summary_ttl_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
