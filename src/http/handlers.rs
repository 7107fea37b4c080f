//! Route handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::analytics::{ExternalData, MetricRecord, MetricSummary};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::resilience::circuit_breaker::{CircuitError, CircuitState};
use crate::store::CacheStore;

/// Query string of `GET /api/metrics/summary`.
#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_period() -> String {
    "daily".to_string()
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub circuit: CircuitState,
    pub store: &'static str,
}

/// `POST /api/metrics`
pub async fn create_metric(
    State(state): State<AppState>,
    Json(metric): Json<MetricRecord>,
) -> (StatusCode, Json<Value>) {
    tracing::debug!(kind = %metric.kind, value = metric.value, "Metric received");
    state.metrics.add(metric);
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Metric received" })),
    )
}

/// `GET /api/metrics/summary?type=..&period=..`
pub async fn get_metrics_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Json<MetricSummary> {
    Json(state.summaries.summarize(&query.kind, &query.period).await)
}

/// `GET /api/external-data`, guarded by the circuit breaker.
pub async fn get_external_data(
    State(state): State<AppState>,
) -> Result<Json<ExternalData>, ApiError> {
    let external = state.external.clone();
    match state.breaker.call(|| async move { external.fetch().await }).await {
        Ok(data) => Ok(Json(data)),
        Err(CircuitError::Open { .. }) => Err(ApiError::CircuitOpen),
        Err(CircuitError::Operation(e)) => {
            tracing::warn!(error = %e, "External data fetch failed");
            Err(ApiError::BadGateway(e.to_string()))
        }
    }
}

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let store = match state.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Store ping failed");
            "unavailable"
        }
    };

    Json(HealthStatus {
        status: "ok",
        circuit: state.breaker.state().await,
        store,
    })
}
