//! Background scheduler: warm-up, backfill, refresh ticks, run-lock, shutdown.

mod support;

use std::sync::Arc;
use std::time::Duration;

use kennel_api::{SchedulerState, TriggerAck, TriggerOutcome};
use kennel_core::{IngestConfig, RetryConfig, RunKind, SchedulerConfig, StopReason};
use kennel_storage::LmdbPageStore;
use kennel_test_utils::{fixtures, ScriptedUpstream, Step};
use support::harness;

fn slow_retry() -> RetryConfig {
    RetryConfig {
        attempt_timeout: Duration::from_secs(30),
        ..fixtures::fast_retry()
    }
}

fn full_pages(upstream: &ScriptedUpstream, last: u32) {
    upstream.always_range(1..=last, |page| {
        Step::Records(fixtures::full_page(&format!("P{page}")))
    });
}

#[tokio::test(start_paused = true)]
async fn test_start_runs_warmup_before_returning() {
    let upstream = ScriptedUpstream::new();
    full_pages(&upstream, 3);
    let h = harness(upstream).build();

    let warmup = h.scheduler().start().await.expect("warm-up ran");

    assert_eq!(warmup.kind, RunKind::Warmup);
    assert_eq!(warmup.pages_succeeded, 3);
    assert_eq!(warmup.stop_reason, StopReason::EndOfData);
    assert_eq!(h.service.get_page(1).await.len(), 15);

    h.scheduler().shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_run_exactly_once() {
    let upstream = ScriptedUpstream::new().with_latency(Duration::from_secs(1));
    full_pages(&upstream, 1);
    let h = harness(upstream).retry(slow_retry()).build();
    let scheduler = h.scheduler();

    let (first, second) = tokio::join!(scheduler.trigger_refresh(), scheduler.trigger_refresh());

    let outcomes = [&first, &second];
    let started = outcomes
        .iter()
        .filter(|o| matches!(o, TriggerOutcome::Started(_)))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, TriggerOutcome::Skipped))
        .count();
    assert_eq!((started, skipped), (1, 1));
    assert_eq!(h.upstream.calls_for(1), 1);
    assert_eq!(scheduler.metrics().runs_skipped, 1);
    assert_eq!(scheduler.metrics().runs_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_ticks_skip_while_backfill_runs() {
    let upstream = ScriptedUpstream::new().with_latency(Duration::from_secs(4));
    full_pages(&upstream, 10);
    let ingest = IngestConfig {
        warmup_pages: 1,
        ..fixtures::ingest()
    };
    let config = SchedulerConfig {
        refresh_interval: Duration::from_secs(10),
        ..SchedulerConfig::default()
    };
    let h = harness(upstream)
        .retry(slow_retry())
        .ingest(ingest)
        .scheduler(config)
        .build();
    let scheduler = Arc::clone(h.scheduler());

    scheduler.start().await.expect("warm-up ran");

    // Backfill takes about 56s; three ticks land inside it.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(scheduler.state(), SchedulerState::Backfill);
    assert!(scheduler.metrics().runs_skipped >= 3);

    // Backfill is done and the next tick has started a refresh.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(scheduler.state(), SchedulerState::Refreshing);
    let backfill = scheduler.last_run().expect("backfill finished");
    assert_eq!(backfill.kind, RunKind::Backfill);
    assert_eq!(backfill.total_pages_after, 10);

    scheduler.shutdown().await;

    assert_eq!(scheduler.state(), SchedulerState::Idle);
    let interrupted = scheduler.last_run().expect("refresh finished");
    assert_eq!(interrupted.kind, RunKind::Refresh);
    assert_eq!(interrupted.stop_reason, StopReason::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_ticks_skip_while_refresh_runs() {
    let upstream = ScriptedUpstream::new().with_latency(Duration::from_secs(1));
    full_pages(&upstream, 30);
    let ingest = IngestConfig {
        warmup_pages: 1,
        ..fixtures::ingest()
    };
    let config = SchedulerConfig {
        refresh_interval: Duration::from_secs(10),
        ..SchedulerConfig::default()
    };
    let h = harness(upstream)
        .retry(slow_retry())
        .ingest(ingest)
        .scheduler(config)
        .build();
    let scheduler = Arc::clone(h.scheduler());

    scheduler.start().await.expect("warm-up ran");

    // Backfill and the first refresh each take 34s against a 10s interval:
    // three ticks land in each and none of them queues.
    tokio::time::sleep(Duration::from_secs(77)).await;

    let metrics = scheduler.metrics();
    assert_eq!(metrics.runs_completed, 3);
    assert_eq!(metrics.runs_skipped, 6);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    let refresh = scheduler.last_run().expect("refresh finished");
    assert_eq!(refresh.kind, RunKind::Refresh);
    assert_eq!(refresh.pages_succeeded, 30);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_ignored() {
    let upstream = ScriptedUpstream::new();
    full_pages(&upstream, 3);
    let h = harness(upstream).build();
    let scheduler = Arc::clone(h.scheduler());

    scheduler.start().await.expect("warm-up ran");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(scheduler.start().await.is_none());
    tokio::time::sleep(Duration::from_secs(5)).await;

    // One warm-up and one backfill, nothing more.
    assert_eq!(scheduler.metrics().runs_completed, 2);
    assert_eq!(h.upstream.calls_for(3), 2);
    assert_eq!(
        scheduler.last_run().map(|run| run.kind),
        Some(RunKind::Backfill)
    );

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_state_changes_are_observable() {
    let upstream = ScriptedUpstream::new().with_latency(Duration::from_secs(1));
    full_pages(&upstream, 2);
    let h = harness(upstream).retry(slow_retry()).build();
    let scheduler = Arc::clone(h.scheduler());
    let mut states = scheduler.subscribe_state();

    assert_eq!(scheduler.spawn_refresh(), TriggerAck::Started);

    states.changed().await.expect("scheduler alive");
    assert_eq!(*states.borrow_and_update(), SchedulerState::Refreshing);
    states
        .wait_for(|state| *state == SchedulerState::Idle)
        .await
        .expect("scheduler alive");
    assert_eq!(scheduler.metrics().runs_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_backfill_waits_for_lock_and_runs_once() {
    let upstream = ScriptedUpstream::new().with_latency(Duration::from_secs(1));
    full_pages(&upstream, 3);
    let h = harness(upstream).retry(slow_retry()).build();
    let scheduler = Arc::clone(h.scheduler());

    assert_eq!(scheduler.spawn_refresh(), TriggerAck::Started);
    // The warm-up finds the lock held and is skipped.
    assert!(scheduler.start().await.is_none());

    tokio::time::sleep(Duration::from_secs(30)).await;

    let last = scheduler.last_run().expect("backfill finished");
    assert_eq!(last.kind, RunKind::Backfill);
    assert_eq!(last.stop_reason, StopReason::EndOfData);
    assert_eq!(last.total_pages_after, 3);
    assert_eq!(scheduler.metrics().runs_completed, 2);
    assert!(scheduler.metrics().runs_skipped >= 2);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_runs_after_shutdown() {
    let upstream = ScriptedUpstream::new();
    full_pages(&upstream, 2);
    let h = harness(upstream).build();
    let scheduler = Arc::clone(h.scheduler());

    scheduler.start().await;
    scheduler.shutdown().await;
    let calls = h.upstream.total_calls();

    assert!(scheduler.is_shutting_down());
    assert_eq!(scheduler.trigger_refresh().await, TriggerOutcome::ShuttingDown);
    assert_eq!(scheduler.spawn_refresh(), TriggerAck::ShuttingDown);

    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(h.upstream.total_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_bounded_by_grace_period() {
    let upstream = ScriptedUpstream::new();
    upstream.always(1, Step::Records(fixtures::full_page("Seed")));
    upstream.always(2, Step::Hang);
    let config = SchedulerConfig {
        shutdown_grace: Duration::from_secs(2),
        ..SchedulerConfig::default()
    };
    let h = harness(upstream)
        .retry(slow_retry())
        .scheduler(config)
        .build();
    let scheduler = Arc::clone(h.scheduler());
    h.seed(fixtures::valid_page(1, "Seed", 15)).await;

    scheduler.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.state(), SchedulerState::Backfill);

    let started = tokio::time::Instant::now();
    scheduler.shutdown().await;

    assert!(started.elapsed() <= Duration::from_secs(2));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_populated_store_skips_warmup_on_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(LmdbPageStore::open(dir.path(), 16).expect("open store"));

    let first = ScriptedUpstream::new();
    full_pages(&first, 3);
    let h = harness(first).store(store.clone()).build();
    h.scheduler().start().await.expect("first boot warms up");
    h.scheduler().shutdown().await;

    let second = ScriptedUpstream::new();
    full_pages(&second, 3);
    let restarted = harness(second).store(store.clone()).build();

    assert!(restarted.scheduler().start().await.is_none());
    assert_eq!(restarted.service.get_page(2).await.len(), 15);
    assert_eq!(restarted.service.get_stats().await.total_pages, 3);

    restarted.scheduler().shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_warmup_forced_when_configured() {
    let upstream = ScriptedUpstream::new();
    full_pages(&upstream, 2);
    let config = SchedulerConfig {
        warmup_when_populated: true,
        ..SchedulerConfig::default()
    };
    let h = harness(upstream).scheduler(config).build();
    h.seed(fixtures::valid_page(1, "Old", 15)).await;

    let warmup = h.scheduler().start().await.expect("warm-up forced");
    assert_eq!(warmup.pages_succeeded, 2);

    h.scheduler().shutdown().await;
}
