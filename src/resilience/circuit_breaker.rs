//! Circuit breaker for downstream dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: one trial call decides whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: now - last_failure_time > reset_timeout (checked on call)
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (threshold ignored)
//! ```
//!
//! # Design Decisions
//! - One breaker per protected dependency, shared via `Arc`
//! - The whole check → transition → invoke → record sequence runs under a
//!   single async mutex, so calls through one breaker are strictly serialized
//!   and only one trial call can ever be in flight
//! - Operation errors pass through untouched inside `CircuitError::Operation`

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Errors returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The call was rejected without invoking the operation.
    #[error("circuit '{breaker}' is open")]
    Open { breaker: String },

    /// The operation ran and failed; the failure was recorded.
    #[error(transparent)]
    Operation(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// The operation's own error, if it ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            CircuitError::Operation(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }
}

/// Point-in-time view of a breaker, for health output and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Seconds since the epoch of the most recent recorded failure.
    pub last_failure_secs: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Duration>,
}

/// Three-state circuit breaker guarding an async operation.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker reading the system clock.
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            reset_timeout,
            clock: Arc::new(SystemClock),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            Duration::from_secs(config.reset_timeout_secs),
        )
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock().await;
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_secs: inner.last_failure_time.map(|t| t.as_secs()),
        }
    }

    /// Run `operation` under circuit protection.
    ///
    /// The breaker lock is held until the operation completes, so a second
    /// caller waits rather than racing the first one's outcome.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut inner = self.inner.lock().await;

        if inner.state == CircuitState::Open {
            if self.reset_timeout_elapsed(&inner) {
                self.transition(&mut inner, CircuitState::HalfOpen);
            } else {
                tracing::debug!(breaker = %self.name, "Circuit open, rejecting call");
                metrics::record_circuit_rejection(&self.name);
                return Err(CircuitError::Open {
                    breaker: self.name.clone(),
                });
            }
        }

        match operation().await {
            Ok(value) => {
                self.record_success(&mut inner);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(&mut inner);
                Err(CircuitError::Operation(e))
            }
        }
    }

    fn reset_timeout_elapsed(&self, inner: &BreakerInner) -> bool {
        match inner.last_failure_time {
            Some(last) => self.clock.now().saturating_sub(last) > self.reset_timeout,
            None => true,
        }
    }

    fn record_success(&self, inner: &mut BreakerInner) {
        inner.failure_count = 0;
        if inner.state != CircuitState::Closed {
            self.transition(inner, CircuitState::Closed);
        }
    }

    fn record_failure(&self, inner: &mut BreakerInner) {
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(self.clock.now());

        tracing::debug!(
            breaker = %self.name,
            failure_count = inner.failure_count,
            "Failure recorded"
        );

        let trips = inner.state == CircuitState::HalfOpen
            || inner.failure_count >= self.failure_threshold;
        if trips && inner.state != CircuitState::Open {
            self.transition(inner, CircuitState::Open);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                failure_count = inner.failure_count,
                "Circuit opened"
            ),
            _ => tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit state changed"),
        }
        metrics::record_circuit_state(&self.name, to);
    }
}
