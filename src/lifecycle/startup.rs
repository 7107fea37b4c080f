//! Startup orchestration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{AppConfig, StoreBackend};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::observability::metrics;
use crate::store::{MemoryStore, RedisStore, Store, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store initialisation failed: {0}")]
    Store(#[from] StoreError),

    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the configured store, starting the expiry sweep for the memory
/// backend.
async fn open_store(config: &AppConfig, shutdown: &Shutdown) -> Result<Arc<dyn Store>, StoreError> {
    match config.store.backend {
        StoreBackend::Memory => {
            let memory = MemoryStore::new();
            memory.spawn_purger(
                Duration::from_secs(config.store.purge_interval_secs),
                shutdown.subscribe(),
            );
            tracing::info!("Using in-memory store");
            Ok(Arc::new(memory))
        }
        StoreBackend::Redis => {
            tracing::info!(
                host = %config.store.redis_host,
                port = config.store.redis_port,
                "Connecting to Redis"
            );
            let redis = RedisStore::from_config(&config.store).await?;
            Ok(Arc::new(redis))
        }
    }
}

/// Start every subsystem and serve until a shutdown signal arrives.
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let store = open_store(&config, &shutdown).await?;
    let state = AppState::new(&config, store);

    tracing::info!(
        limit = config.rate_limit.limit,
        window_secs = config.rate_limit.window_secs,
        failure_threshold = config.circuit_breaker.failure_threshold,
        reset_timeout_secs = config.circuit_breaker.reset_timeout_secs,
        "Resilience settings loaded"
    );

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config, state);

    tokio::spawn(wait_for_signal(shutdown.clone()));
    server.run(listener, server_shutdown).await?;

    Ok(())
}
