//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID, rate limiting)
//! - Serve on a listener until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::analytics::{ExternalService, MetricStore, SummaryService};
use crate::config::AppConfig;
use crate::http::handlers::{create_metric, get_external_data, get_metrics_summary, health_check};
use crate::http::request::{request_id_of, UuidRequestId};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::clock::{Clock, SystemClock};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter, RateLimiterState};
use crate::store::Store;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: MetricStore,
    pub summaries: Arc<SummaryService>,
    pub breaker: Arc<CircuitBreaker>,
    pub external: ExternalService,
    pub store: Arc<dyn Store>,
    pub rate_limiter: Arc<RateLimiterState>,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn Store>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Build state whose breaker and limiter read `clock`.
    pub fn with_clock(config: &AppConfig, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let metrics = MetricStore::new();

        let breaker = CircuitBreaker::from_config("external-data", &config.circuit_breaker)
            .with_clock(clock.clone());

        let limiter = RateLimiter::from_config(store.clone(), &config.rate_limit).with_clock(clock);

        Self {
            summaries: Arc::new(SummaryService::new(
                metrics.clone(),
                store.clone(),
                config.cache.summary_ttl_secs,
            )),
            metrics,
            breaker: Arc::new(breaker),
            external: ExternalService::from_config(&config.external_service),
            rate_limiter: Arc::new(RateLimiterState::new(
                limiter,
                config.rate_limit.on_store_error,
            )),
            store,
        }
    }
}

/// HTTP server for the analytics API.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and state.
    pub fn new(config: AppConfig, state: AppState) -> Self {
        let router = build_router(&config, state);
        Self { router, config }
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            app = %self.config.server.app_name,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &AppConfig, state: AppState) -> Router {
    let mut ingest: MethodRouter<AppState> = post(create_metric);
    if config.rate_limit.enabled {
        ingest = ingest.route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));
    }

    Router::new()
        .route("/api/metrics", ingest)
        .route("/api/metrics/summary", get(get_metrics_summary))
        .route("/api/external-data", get(get_external_data))
        .route("/health", get(health_check))
        .route_layer(middleware::from_fn(record_metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_secs,
                ))),
        )
}

/// Count every request by matched route and status.
async fn record_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();

    tracing::debug!(
        request_id = %request_id_of(&request),
        method = %method,
        route = %route,
        "Handling request"
    );

    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), &route, start);
    response
}
