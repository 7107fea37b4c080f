//! Error responses.
//!
//! Maps the service's failure signals onto HTTP:
//! - rate limit exceeded → 429 with `Retry-After`
//! - rate limiter store down (policy `reject`) → 503
//! - circuit open → 503
//! - downstream operation failed → 502
//!
//! Bodies are `{"detail": "..."}`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Too Many Requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("Rate limiter unavailable")]
    RateLimiterUnavailable,

    #[error("Service Unavailable (Circuit Open)")]
    CircuitOpen,

    #[error("{0}")]
    BadGateway(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RateLimiterUnavailable | ApiError::CircuitOpen => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(json!({ "detail": self.to_string() }))).into_response();

        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}
