//! Per-client fixed-window rate limiting.
//!
//! # Algorithm
//! ```text
//! window_index = floor(now / window)
//! key          = rate_limit:{client}:{window_index}
//! count        = INCR key                  (atomic, in the store)
//! count == 1   → EXPIRE key window         (once per window)
//! count > limit→ denied, retry_after = TTL key (or window if TTL <= 0)
//! TTL == -1    → EXPIRE key window         (first expiry was lost)
//! ```
//!
//! # Design Decisions
//! - The limiter is stateless; all counting lives in the shared store, so
//!   every process pointed at the same store shares the same limits
//! - Windows are wall-clock aligned: a client can burst up to 2 × limit
//!   across a boundary
//! - Store failures are returned, never turned into allow/deny here; the
//!   middleware applies the configured `StoreFailurePolicy`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::{RateLimitConfig, StoreFailurePolicy};
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};
use crate::store::{self, CounterStore, Store, StoreError};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Advisory wait before retrying; 0 when allowed.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    pub fn deny(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs,
        }
    }
}

/// Errors from a rate-limit check.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The counter store could not answer.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fixed-window request counter over a shared [`CounterStore`].
pub struct RateLimiter<S: ?Sized = dyn Store> {
    limit: u32,
    window_secs: u64,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: CounterStore + ?Sized> RateLimiter<S> {
    /// `limit` requests per `window_secs`, both expected to be non-zero.
    pub fn new(store: Arc<S>, limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window_secs: window_secs.max(1),
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(store: Arc<S>, config: &RateLimitConfig) -> Self {
        Self::new(store, config.limit, config.window_secs)
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Index of the wall-clock window containing now.
    pub fn current_window(&self) -> u64 {
        self.clock.now().as_secs() / self.window_secs
    }

    /// Store key for `client` in `window_index`.
    pub fn counter_key(client: &str, window_index: u64) -> String {
        format!("rate_limit:{}:{}", client, window_index)
    }

    /// Count one request for `client` and decide whether it may proceed.
    pub async fn is_allowed(&self, client: &str) -> Result<RateLimitDecision, RateLimitError> {
        let key = Self::counter_key(client, self.current_window());

        let count = self
            .store
            .increment(&key)
            .await
            .map_err(|e| store::report("increment", e))?;

        if count < 1 {
            return Err(store::report(
                "increment",
                StoreError::Inconsistent(format!("counter '{}' returned {}", key, count)),
            )
            .into());
        }

        if count == 1 {
            self.store
                .set_expiry(&key, self.window_secs)
                .await
                .map_err(|e| store::report("set_expiry", e))?;
        }

        if count <= i64::from(self.limit) {
            return Ok(RateLimitDecision::allow());
        }

        let ttl = match self.store.remaining_ttl(&key).await {
            Ok(-1) => {
                // The expiry set on the first request was lost; re-arm it so
                // the counter cannot outlive its window.
                if let Err(e) = self.store.set_expiry(&key, self.window_secs).await {
                    store::report("set_expiry", e);
                }
                -1
            }
            Ok(ttl) => ttl,
            Err(e) => {
                // Already over the limit; a missing TTL only weakens the hint.
                store::report("remaining_ttl", e);
                -1
            }
        };
        let retry_after = if ttl > 0 { ttl as u64 } else { self.window_secs };

        Ok(RateLimitDecision::deny(retry_after))
    }
}

/// State for the rate limit middleware.
pub struct RateLimiterState {
    pub limiter: RateLimiter,
    pub on_store_error: StoreFailurePolicy,
}

impl RateLimiterState {
    pub fn new(limiter: RateLimiter, on_store_error: StoreFailurePolicy) -> Self {
        Self {
            limiter,
            on_store_error,
        }
    }

    /// Decide for `client`, applying the store failure policy.
    pub async fn check(&self, client: &str) -> Result<RateLimitDecision, ApiError> {
        match self.limiter.is_allowed(client).await {
            Ok(decision) => {
                metrics::record_rate_limit_decision(if decision.allowed {
                    "allowed"
                } else {
                    "denied"
                });
                Ok(decision)
            }
            Err(e) => {
                metrics::record_rate_limit_decision("store_error");
                match self.on_store_error {
                    StoreFailurePolicy::FailOpen => {
                        tracing::warn!(client, error = %e, "Rate limiter store unavailable, admitting request");
                        Ok(RateLimitDecision::allow())
                    }
                    StoreFailurePolicy::FailClosed => {
                        tracing::warn!(client, error = %e, "Rate limiter store unavailable, denying request");
                        Ok(RateLimitDecision::deny(self.limiter.window_secs()))
                    }
                    StoreFailurePolicy::Reject => Err(ApiError::RateLimiterUnavailable),
                }
            }
        }
    }
}

/// Identity used for limiting: the peer IP, if the server recorded it.
fn client_identity(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_identity(&request);

    match state.check(&client).await {
        Ok(decision) if decision.allowed => next.run(request).await,
        Ok(decision) => {
            tracing::warn!(
                client = %client,
                retry_after = decision.retry_after_secs,
                "Rate limit exceeded"
            );
            ApiError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            }
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use crate::store::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted store recording every call it receives.
    #[derive(Default)]
    struct ScriptedStore {
        count: Mutex<i64>,
        ttl: Option<i64>,
        fail_increment: bool,
        fail_ttl: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedStore {
        fn starting_at(count: i64) -> Self {
            Self {
                count: Mutex::new(count),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CounterStore for ScriptedStore {
        async fn increment(&self, key: &str) -> StoreResult<i64> {
            self.calls.lock().unwrap().push(format!("incr {}", key));
            if self.fail_increment {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            let mut count = self.count.lock().unwrap();
            *count += 1;
            Ok(*count)
        }

        async fn set_expiry(&self, key: &str, seconds: u64) -> StoreResult<()> {
            self.calls.lock().unwrap().push(format!("expire {} {}", key, seconds));
            Ok(())
        }

        async fn remaining_ttl(&self, key: &str) -> StoreResult<i64> {
            self.calls.lock().unwrap().push(format!("ttl {}", key));
            if self.fail_ttl {
                return Err(StoreError::Unavailable("timeout".into()));
            }
            Ok(self.ttl.unwrap_or(-1))
        }
    }

    #[tokio::test]
    async fn test_first_request_sets_expiry_once() {
        let store = Arc::new(ScriptedStore::default());
        let clock = Arc::new(ManualClock::at_secs(6_000));
        let limiter = RateLimiter::new(store.clone(), 5, 60).with_clock(clock);

        let decision = limiter.is_allowed("127.0.0.1").await.unwrap();
        assert_eq!(decision, RateLimitDecision::allow());
        limiter.is_allowed("127.0.0.1").await.unwrap();

        assert_eq!(
            store.calls(),
            vec![
                "incr rate_limit:127.0.0.1:100",
                "expire rate_limit:127.0.0.1:100 60",
                "incr rate_limit:127.0.0.1:100",
            ]
        );
    }

    #[tokio::test]
    async fn test_over_limit_uses_store_ttl() {
        let store = Arc::new(ScriptedStore {
            ttl: Some(30),
            ..ScriptedStore::starting_at(5)
        });
        let limiter = RateLimiter::new(store.clone(), 5, 60);

        let decision = limiter.is_allowed("127.0.0.1").await.unwrap();
        assert_eq!(decision, RateLimitDecision::deny(30));
        assert!(!store.calls().iter().any(|c| c.starts_with("expire")));
    }

    #[tokio::test]
    async fn test_over_limit_without_ttl_falls_back_to_window() {
        let store = Arc::new(ScriptedStore::starting_at(5));
        let limiter = RateLimiter::new(store, 5, 60);
        assert_eq!(
            limiter.is_allowed("c").await.unwrap(),
            RateLimitDecision::deny(60)
        );
    }

    #[tokio::test]
    async fn test_counter_without_expiry_is_rearmed() {
        let store = Arc::new(ScriptedStore::starting_at(7));
        let clock = Arc::new(ManualClock::at_secs(6_000));
        let limiter = RateLimiter::new(store.clone(), 5, 60).with_clock(clock);

        assert_eq!(
            limiter.is_allowed("c").await.unwrap(),
            RateLimitDecision::deny(60)
        );
        assert_eq!(
            store.calls(),
            vec![
                "incr rate_limit:c:100",
                "ttl rate_limit:c:100",
                "expire rate_limit:c:100 60",
            ]
        );
    }

    #[tokio::test]
    async fn test_oversized_window_is_a_store_error() {
        let clock = Arc::new(ManualClock::at_secs(6_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::new(store, 5, u64::MAX).with_clock(clock);

        let err = limiter.is_allowed("c").await.unwrap_err();
        assert!(matches!(err, RateLimitError::Store(StoreError::Inconsistent(_))));
    }

    #[tokio::test]
    async fn test_failed_ttl_lookup_falls_back_to_window() {
        let store = Arc::new(ScriptedStore {
            fail_ttl: true,
            ..ScriptedStore::starting_at(9)
        });
        let limiter = RateLimiter::new(store, 5, 60);
        assert_eq!(
            limiter.is_allowed("c").await.unwrap(),
            RateLimitDecision::deny(60)
        );
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let store = Arc::new(ScriptedStore {
            fail_increment: true,
            ..ScriptedStore::default()
        });
        let limiter = RateLimiter::new(store, 5, 60);
        let err = limiter.is_allowed("c").await.unwrap_err();
        assert!(matches!(err, RateLimitError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_limit_then_reject_with_memory_store() {
        let clock = Arc::new(ManualClock::at_secs(6_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::new(store.clone(), 5, 60).with_clock(clock.clone());

        for _ in 0..5 {
            assert_eq!(
                limiter.is_allowed("10.0.0.1").await.unwrap(),
                RateLimitDecision::allow()
            );
        }

        clock.advance(Duration::from_secs(20));
        assert_eq!(
            limiter.is_allowed("10.0.0.1").await.unwrap(),
            RateLimitDecision::deny(40)
        );

        // Other clients are untouched.
        assert!(!store.contains_key("rate_limit:10.0.0.2:100"));
        assert!(limiter.is_allowed("10.0.0.2").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_new_window_resets_count() {
        let clock = Arc::new(ManualClock::at_secs(6_059));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::new(store, 2, 60).with_clock(clock.clone());

        assert!(limiter.is_allowed("c").await.unwrap().allowed);
        assert!(limiter.is_allowed("c").await.unwrap().allowed);
        assert!(!limiter.is_allowed("c").await.unwrap().allowed);

        // Boundary crossing: a fresh window, so the burst continues.
        clock.set_secs(6_060);
        assert!(limiter.is_allowed("c").await.unwrap().allowed);
        assert!(limiter.is_allowed("c").await.unwrap().allowed);
        assert!(!limiter.is_allowed("c").await.unwrap().allowed);
    }

    fn state_with(policy: StoreFailurePolicy) -> RateLimiterState {
        let store: Arc<dyn Store> = Arc::new(BrokenStore);
        RateLimiterState::new(RateLimiter::new(store, 5, 60), policy)
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn increment(&self, _key: &str) -> StoreResult<i64> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn set_expiry(&self, _key: &str, _seconds: u64) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn remaining_ttl(&self, _key: &str) -> StoreResult<i64> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[async_trait]
    impl crate::store::CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: u64) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_policies() {
        let open = state_with(StoreFailurePolicy::FailOpen).check("c").await;
        assert_eq!(open.unwrap(), RateLimitDecision::allow());

        let closed = state_with(StoreFailurePolicy::FailClosed).check("c").await;
        assert_eq!(closed.unwrap(), RateLimitDecision::deny(60));

        let reject = state_with(StoreFailurePolicy::Reject).check("c").await;
        assert!(matches!(reject, Err(ApiError::RateLimiterUnavailable)));
    }
}
