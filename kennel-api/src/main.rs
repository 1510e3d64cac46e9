//! Kennel API Server Entry Point
//!
//! Loads configuration, opens the durable page store, runs the warm-up, and
//! serves the read API while the scheduler backfills and refreshes.

use std::sync::Arc;

use kennel_api::telemetry::{init_tracing, TelemetryConfig};
use kennel_api::{assemble, create_router, ApiError, ApiResult, KennelConfig};
use kennel_core::SystemClock;
use kennel_storage::LmdbPageStore;
use kennel_upstream::HttpUpstream;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let config = KennelConfig::from_env()?;
    config.validate()?;

    let store = Arc::new(LmdbPageStore::open(&config.store.path, config.store.max_size_mb)?);
    let upstream = Arc::new(HttpUpstream::new(&config.upstream, config.retry.attempt_timeout)?);

    let service = assemble(
        upstream,
        store,
        Arc::new(SystemClock),
        &config.retry,
        config.ingest.clone(),
        config.scheduler.clone(),
    );
    let scheduler = Arc::clone(service.scheduler());

    if let Some(summary) = scheduler.start().await {
        tracing::info!(
            pages_succeeded = summary.pages_succeeded,
            pages_failed = summary.pages_failed(),
            "Warm-up complete"
        );
    }

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ApiError::Bind { addr, source })?;
    tracing::info!(%addr, upstream = %config.upstream.base_url, "Starting kennel API server");

    axum::serve(listener, create_router(service))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(ApiError::Serve)?;

    scheduler.shutdown().await;
    Ok(())
}
