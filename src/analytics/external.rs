//! Simulated unreliable downstream dependency.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExternalServiceConfig;

/// Payload returned by a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalData {
    pub data: String,
    pub value: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalServiceError {
    #[error("Simulated external service failure")]
    Failed,
}

/// Fetches data after a fixed latency, failing at a configured rate.
#[derive(Debug, Clone)]
pub struct ExternalService {
    failure_rate: f64,
    latency: Duration,
}

impl ExternalService {
    pub fn new(failure_rate: f64, latency: Duration) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            latency,
        }
    }

    pub fn from_config(config: &ExternalServiceConfig) -> Self {
        Self::new(config.failure_rate, Duration::from_millis(config.latency_ms))
    }

    pub async fn fetch(&self) -> Result<ExternalData, ExternalServiceError> {
        tokio::time::sleep(self.latency).await;

        let (failed, value) = {
            let mut rng = rand::thread_rng();
            (rng.gen::<f64>() < self.failure_rate, rng.gen_range(1..=100))
        };
        if failed {
            tracing::debug!("External service call failed");
            return Err(ExternalServiceError::Failed);
        }

        Ok(ExternalData {
            data: "success".to_string(),
            value,
        })
    }
}
