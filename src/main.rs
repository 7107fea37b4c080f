//! Resilient Analytics API
//!
//! A metrics ingestion service guarded by a per-client rate limiter and a
//! circuit breaker in front of a flaky downstream dependency.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │              ANALYTICS SERVICE               │
//!                         │                                              │
//!   POST /api/metrics ────┼─▶ rate limiter ──▶ ingest ──▶ MetricStore    │
//!                         │        │                                     │
//!                         │        ▼                                     │
//!                         │   counter store (Redis / memory)             │
//!                         │        ▲                                     │
//!   GET  /api/metrics/ ───┼─▶ summary ──▶ cache (60s TTL)                │
//!        summary          │                                              │
//!                         │                                              │
//!   GET  /api/external- ──┼─▶ circuit breaker ──▶ external service       │
//!        data             │                                              │
//!                         │  ┌────────────────────────────────────────┐  │
//!                         │  │  config · observability · lifecycle    │  │
//!                         │  └────────────────────────────────────────┘  │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use resilient_analytics::config::load_config;
use resilient_analytics::lifecycle;
use resilient_analytics::observability::logging::init_logging;

#[derive(Debug, Parser)]
#[command(name = "resilient-analytics", version, about = "Resilient Analytics API")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.observability.log_level);

    tracing::info!(
        app_name = %config.server.app_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting"
    );
    tracing::info!(
        bind_address = %config.server.bind_address,
        store_backend = ?config.store.backend,
        request_timeout_secs = config.server.request_timeout_secs,
        "Configuration loaded"
    );

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
