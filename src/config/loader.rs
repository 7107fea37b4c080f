//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for environment variable {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: TOML file if given (defaults otherwise), then
/// environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the supported environment overrides using `lookup` to read them.
///
/// Recognised: `APP_NAME`, `REDIS_HOST`, `REDIS_PORT`,
/// `EXTERNAL_SERVICE_FAILURE_RATE`.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    if let Some(name) = lookup("APP_NAME") {
        config.server.app_name = name;
    }
    if let Some(host) = lookup("REDIS_HOST") {
        config.store.redis_host = host;
    }
    if let Some(port) = lookup("REDIS_PORT") {
        config.store.redis_port = port.parse().map_err(|_| ConfigError::Env {
            var: "REDIS_PORT",
            value: port.clone(),
        })?;
    }
    if let Some(rate) = lookup("EXTERNAL_SERVICE_FAILURE_RATE") {
        config.external_service.failure_rate = rate.parse().map_err(|_| ConfigError::Env {
            var: "EXTERNAL_SERVICE_FAILURE_RATE",
            value: rate.clone(),
        })?;
    }
    Ok(())
}
