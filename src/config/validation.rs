//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! All problems are collected so one run reports everything wrong.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Key lifetimes must be positive and fit a Redis `EXPIRE` argument.
fn check_expiry(field: &'static str, secs: u64) -> Option<ValidationError> {
    if secs == 0 {
        Some(ValidationError::new(field, "must be > 0"))
    } else if secs > i64::MAX as u64 {
        Some(ValidationError::new(field, format!("must be <= {}", i64::MAX)))
    } else {
        None
    }
}

/// Check `config`, returning every violation found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }

    if config.store.redis_host.trim().is_empty() {
        errors.push(ValidationError::new("store.redis_host", "must not be empty"));
    }
    if config.store.purge_interval_secs == 0 {
        errors.push(ValidationError::new("store.purge_interval_secs", "must be > 0"));
    }
    if config.store.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("store.connect_timeout_ms", "must be > 0"));
    }
    if config.store.response_timeout_ms == 0 {
        errors.push(ValidationError::new("store.response_timeout_ms", "must be > 0"));
    }

    if config.rate_limit.limit == 0 {
        errors.push(ValidationError::new("rate_limit.limit", "must be > 0"));
    }
    if let Some(e) = check_expiry("rate_limit.window_secs", config.rate_limit.window_secs) {
        errors.push(e);
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be > 0",
        ));
    }

    if let Some(e) = check_expiry("cache.summary_ttl_secs", config.cache.summary_ttl_secs) {
        errors.push(e);
    }

    let rate = config.external_service.failure_rate;
    if !(0.0..=1.0).contains(&rate) {
        errors.push(ValidationError::new(
            "external_service.failure_rate",
            format!("{} is outside [0, 1]", rate),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
