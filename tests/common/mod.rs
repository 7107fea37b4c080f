//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{Request, Response},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use resilient_analytics::analytics::ExternalService;
use resilient_analytics::config::{AppConfig, StoreBackend};
use resilient_analytics::http::server::build_router;
use resilient_analytics::http::AppState;
use resilient_analytics::resilience::ManualClock;
use resilient_analytics::store::{
    CacheStore, CounterStore, MemoryStore, StoreError, StoreResult,
};

/// A router over a memory store whose time is driven by the test.
pub struct TestApp {
    pub config: AppConfig,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let clock = Arc::new(ManualClock::at_secs(100));
        let store = MemoryStore::with_clock(clock.clone());
        let state = AppState::with_clock(&config, Arc::new(store.clone()), clock.clone());
        Self {
            config,
            state,
            clock,
            store,
        }
    }

    /// Swap the downstream dependency, keeping breaker and limiter state.
    pub fn set_failure_rate(&mut self, failure_rate: f64) {
        self.state.external = ExternalService::new(failure_rate, Duration::ZERO);
    }

    pub fn router(&self) -> Router {
        build_router(&self.config, self.state.clone())
    }

    pub fn advance_secs(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.unwrap()
    }
}

/// Store whose every call fails as if the server were down.
#[derive(Debug)]
pub struct UnreachableStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn increment(&self, _key: &str) -> StoreResult<i64> {
        down()
    }

    async fn set_expiry(&self, _key: &str, _seconds: u64) -> StoreResult<()> {
        down()
    }

    async fn remaining_ttl(&self, _key: &str) -> StoreResult<i64> {
        down()
    }
}

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        down()
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl_secs: u64) -> StoreResult<()> {
        down()
    }

    async fn ping(&self) -> StoreResult<()> {
        down()
    }
}

/// Full router whose store is unreachable.
pub fn unreachable_store_router(config: &AppConfig) -> Router {
    let clock = Arc::new(ManualClock::at_secs(100));
    let state = AppState::with_clock(config, Arc::new(UnreachableStore), clock);
    build_router(config, state)
}

/// Defaults with no downstream latency and a downstream that always succeeds.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.store.backend = StoreBackend::Memory;
    config.external_service.failure_rate = 0.0;
    config.external_service.latency_ms = 0;
    config
}

pub fn client(ip: [u8; 4]) -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::from((ip, 40000)))
}

pub fn post_metric(from: ConnectInfo<SocketAddr>, kind: &str, value: f64) -> Request<Body> {
    let body = serde_json::json!({
        "timestamp": "2024-05-01T12:00:00Z",
        "value": value,
        "type": kind,
    });
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/metrics")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    request.extensions_mut().insert(from);
    request
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
