//! Background Scheduler
//!
//! Drives the ingestion pipeline for the lifetime of the process:
//!
//! - **Warm-up**: the first few pages, synchronously inside [`Scheduler::start`]
//! - **Backfill**: one open-ended walk, exactly once per process
//! - **Refresh**: a re-scan of the known range every `refresh_interval`
//!
//! All runs go through one [`RunLock`]. A refresh tick or manual trigger that
//! finds it held is skipped (never queued); the backfill keeps retrying the
//! lock once per second because it must run once.
//!
//! # State machine
//!
//! `Idle -> Warmup -> Idle -> Backfill -> Idle <-> Refreshing`. Every
//! transition is logged with `from` and `to`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use kennel_core::{RunKind, RunSummary, SchedulerConfig};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::constants::BACKFILL_LOCK_RETRY;
use crate::lock::{RunLock, RunPermit};
use crate::pipeline::{shutdown_signalled, IngestionPipeline};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Warmup,
    Backfill,
    Refreshing,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Warmup => "warmup",
            SchedulerState::Backfill => "backfill",
            SchedulerState::Refreshing => "refreshing",
        }
    }

    fn for_run(kind: RunKind) -> Self {
        match kind {
            RunKind::Warmup => SchedulerState::Warmup,
            RunKind::Backfill => SchedulerState::Backfill,
            RunKind::Refresh | RunKind::Manual => SchedulerState::Refreshing,
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of asking for a run and waiting for it.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Started(RunSummary),
    /// Another run held the lock.
    Skipped,
    ShuttingDown,
}

/// Result of asking for a run without waiting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAck {
    Started,
    Skipped,
    ShuttingDown,
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for scheduler activity since start-up.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    pub runs_completed: AtomicU64,
    pub runs_skipped: AtomicU64,
    pub pages_failed: AtomicU64,
}

/// Point-in-time copy of [`SchedulerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub runs_completed: u64,
    pub runs_skipped: u64,
    pub pages_failed: u64,
}

impl SchedulerMetrics {
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_skipped: self.runs_skipped.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

pub struct Scheduler {
    pipeline: Arc<IngestionPipeline>,
    config: SchedulerConfig,
    lock: RunLock,
    state_tx: watch::Sender<SchedulerState>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    last_run: Mutex<Option<RunSummary>>,
    metrics: SchedulerMetrics,
}

impl Scheduler {
    pub fn new(pipeline: Arc<IngestionPipeline>, config: SchedulerConfig) -> Arc<Self> {
        Self::with_lock(pipeline, config, RunLock::new())
    }

    /// Build a scheduler around an existing run-lock.
    pub fn with_lock(
        pipeline: Arc<IngestionPipeline>,
        config: SchedulerConfig,
        lock: RunLock,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            pipeline,
            config,
            lock,
            state_tx,
            shutdown_tx,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            last_run: Mutex::new(None),
            metrics: SchedulerMetrics::default(),
        })
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn metrics(&self) -> SchedulerSnapshot {
        self.metrics.snapshot()
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        self.last_run
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    /// Run the warm-up, then spawn the backfill and the refresh loop.
    ///
    /// Returns once the warm-up is done (or skipped because the durable store
    /// already holds pages), so the caller can start serving. Only the first
    /// call does anything; the backfill runs once per process.
    pub async fn start(self: &Arc<Self>) -> Option<RunSummary> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Scheduler already started, ignoring start");
            return None;
        }

        let populated = match self.pipeline.store().is_empty().await {
            Ok(empty) => !empty,
            Err(e) => {
                tracing::warn!(error = %e, "Could not inspect store, running warm-up");
                false
            }
        };

        let warmup = if populated && !self.config.warmup_when_populated {
            tracing::info!("Store already populated, skipping warm-up");
            None
        } else {
            match self.trigger(RunKind::Warmup).await {
                TriggerOutcome::Started(summary) => Some(summary),
                _ => None,
            }
        };

        let backfill = tokio::spawn(Arc::clone(self).backfill_task());
        let refresh = tokio::spawn(Arc::clone(self).refresh_task());
        self.track(backfill);
        self.track(refresh);

        warmup
    }

    /// Run `kind` now if no other run is active, and wait for it.
    pub async fn trigger(&self, kind: RunKind) -> TriggerOutcome {
        match self.begin(kind) {
            Ok(permit) => TriggerOutcome::Started(self.execute(kind, permit).await),
            Err(ack) if ack == TriggerAck::ShuttingDown => TriggerOutcome::ShuttingDown,
            Err(_) => TriggerOutcome::Skipped,
        }
    }

    /// Out-of-cycle refresh, waiting for it to finish.
    pub async fn trigger_refresh(&self) -> TriggerOutcome {
        self.trigger(RunKind::Manual).await
    }

    /// Out-of-cycle refresh in the background.
    ///
    /// The run-lock is taken before returning, so `Started` means the run
    /// really is underway.
    pub fn spawn_refresh(self: &Arc<Self>) -> TriggerAck {
        self.spawn_run(RunKind::Manual)
    }

    fn spawn_run(self: &Arc<Self>, kind: RunKind) -> TriggerAck {
        match self.begin(kind) {
            Ok(permit) => {
                let this = Arc::clone(self);
                let task = tokio::spawn(async move {
                    this.execute(kind, permit).await;
                });
                self.track(task);
                TriggerAck::Started
            }
            Err(ack) => ack,
        }
    }

    /// Signal shutdown and wait up to `shutdown_grace` for background tasks.
    ///
    /// No new runs start after this is called. A run in progress stops at its
    /// next page boundary or abandons its in-flight fetch.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        tracing::info!(grace_ms = self.config.shutdown_grace.as_millis() as u64, "Scheduler shutting down");

        let deadline = Instant::now() + self.config.shutdown_grace;

        // A run spawned while the flag was being raised lands in a later batch.
        loop {
            let tasks: Vec<_> = self
                .tasks
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .drain(..)
                .collect();
            if tasks.is_empty() {
                break;
            }
            for mut task in tasks {
                match tokio::time::timeout_at(deadline, &mut task).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task ended abnormally"),
                    Err(_) => {
                        tracing::warn!("Scheduler task exceeded shutdown grace, aborting");
                        task.abort();
                    }
                }
            }
        }

        tracing::info!(metrics = ?self.metrics.snapshot(), "Scheduler stopped");
    }

    fn begin(&self, kind: RunKind) -> Result<RunPermit, TriggerAck> {
        if self.is_shutting_down() {
            tracing::info!(kind = %kind, "Run not started, shutting down");
            return Err(TriggerAck::ShuttingDown);
        }
        match self.lock.try_acquire() {
            Some(permit) => Ok(permit),
            None => {
                self.metrics.runs_skipped.fetch_add(1, Ordering::Relaxed);
                tracing::info!(kind = %kind, state = %self.state(), "Run skipped, another run is active");
                Err(TriggerAck::Skipped)
            }
        }
    }

    async fn execute(&self, kind: RunKind, permit: RunPermit) -> RunSummary {
        self.transition(SchedulerState::for_run(kind));
        let summary = self.pipeline.run_kind(kind, self.shutdown_tx.subscribe()).await;
        self.transition(SchedulerState::Idle);
        drop(permit);

        self.metrics.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .pages_failed
            .fetch_add(u64::from(summary.pages_failed()), Ordering::Relaxed);
        *self.last_run.lock().unwrap_or_else(|p| p.into_inner()) = Some(summary.clone());
        summary
    }

    fn transition(&self, to: SchedulerState) {
        let from = self.state_tx.send_replace(to);
        if from != to {
            tracing::info!(from = %from, to = %to, "Scheduler state transition");
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    async fn backfill_task(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            match self.trigger(RunKind::Backfill).await {
                TriggerOutcome::Started(_) | TriggerOutcome::ShuttingDown => return,
                TriggerOutcome::Skipped => {}
            }
            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => {
                    tracing::info!("Backfill abandoned before it could start");
                    return;
                }
                _ = tokio::time::sleep(BACKFILL_LOCK_RETRY) => {}
            }
        }
    }

    async fn refresh_task(self: Arc<Self>) {
        let period = self.config.refresh_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown_tx.subscribe();

        tracing::info!(refresh_interval_secs = period.as_secs(), "Refresh loop started");

        loop {
            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => {
                    tracing::info!("Refresh loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // Never waits on the run, so every tick meets the lock.
                    self.spawn_run(RunKind::Refresh);
                }
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
