//! Kennel API - Ingestion, Scheduling, and Read Service
//!
//! Wires the upstream fetcher, the validator and the page store into an
//! ingestion pipeline, runs it from a background scheduler, and exposes the
//! cached snapshot through [`KennelService`] and a thin axum router.

pub mod config;
pub mod constants;
pub mod error;
pub mod lock;
pub mod pipeline;
pub mod routes;
pub mod scheduler;
pub mod service;
pub mod telemetry;

pub use config::{KennelConfig, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use lock::{RunLock, RunPermit};
pub use pipeline::{never_shutdown, IngestionPipeline, PageRange};
pub use routes::create_router;
pub use scheduler::{
    Scheduler, SchedulerSnapshot, SchedulerState, TriggerAck, TriggerOutcome,
};
pub use service::{KennelService, StatsView};

use std::sync::Arc;

use kennel_core::{Clock, IngestConfig, RetryConfig, SchedulerConfig};
use kennel_storage::PageStore;
use kennel_upstream::{ResilientFetcher, UpstreamSource};

/// Assemble pipeline, scheduler and service over the given collaborators.
///
/// Nothing is started; call [`Scheduler::start`] on the returned service's
/// scheduler.
pub fn assemble(
    source: Arc<dyn UpstreamSource>,
    store: Arc<dyn PageStore>,
    clock: Arc<dyn Clock>,
    retry: &RetryConfig,
    ingest: IngestConfig,
    scheduler: SchedulerConfig,
) -> Arc<KennelService> {
    let fetcher = ResilientFetcher::from_config(source, retry);
    let pipeline = Arc::new(IngestionPipeline::new(fetcher, Arc::clone(&store), clock, ingest));
    let scheduler = Scheduler::new(pipeline, scheduler);
    Arc::new(KennelService::new(store, scheduler))
}
