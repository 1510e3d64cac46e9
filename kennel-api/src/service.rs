//! Read-side facade exposed to the route layer.
//!
//! Reads go straight to the page store and never trigger a fetch. Failures
//! from the store are logged and rendered as "no data" so nothing from the
//! background subsystem ever surfaces to a reader as an error.

use std::sync::Arc;

use kennel_core::{Page, PageNumber, Timestamp, PAGE_SIZE};
use kennel_storage::PageStore;
use serde::Serialize;

use crate::scheduler::{Scheduler, SchedulerSnapshot, SchedulerState, TriggerAck, TriggerOutcome};

/// Cache statistics as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsView {
    pub total_pages: PageNumber,
    pub total_records: u64,
    pub last_refresh_at: Option<Timestamp>,
    pub items_per_page: usize,
    pub scheduler_state: SchedulerState,
    pub scheduler: SchedulerSnapshot,
}

#[derive(Clone)]
pub struct KennelService {
    store: Arc<dyn PageStore>,
    scheduler: Arc<Scheduler>,
}

impl KennelService {
    pub fn new(store: Arc<dyn PageStore>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Cached page `number`, or an empty page if it was never populated.
    pub async fn get_page(&self, number: PageNumber) -> Page {
        if number == 0 {
            return Page::empty(number);
        }
        match self.store.get_page(number).await {
            Ok(Some(page)) => page,
            Ok(None) => Page::empty(number),
            Err(e) => {
                tracing::error!(page = number, error = %e, "Page read failed, serving empty page");
                Page::empty(number)
            }
        }
    }

    pub async fn get_stats(&self) -> StatsView {
        let stats = match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Stats read failed, serving zeroes");
                Default::default()
            }
        };
        StatsView {
            total_pages: stats.total_pages,
            total_records: stats.total_records,
            last_refresh_at: stats.last_refresh_at,
            items_per_page: PAGE_SIZE,
            scheduler_state: self.scheduler.state(),
            scheduler: self.scheduler.metrics(),
        }
    }

    /// Out-of-cycle refresh, subject to the run-lock. Waits for the run.
    pub async fn trigger_refresh(&self) -> TriggerOutcome {
        self.scheduler.trigger_refresh().await
    }

    /// Out-of-cycle refresh started in the background.
    pub fn request_refresh(&self) -> TriggerAck {
        self.scheduler.spawn_refresh()
    }
}

impl std::fmt::Debug for KennelService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KennelService")
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
