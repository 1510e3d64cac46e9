//! Shared harness for kennel-api integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::TimeZone;
use kennel_api::{assemble, IngestionPipeline, KennelService, Scheduler};
use kennel_core::{IngestConfig, Page, RetryConfig, SchedulerConfig};
use kennel_storage::{InMemoryPageStore, PageStore};
use kennel_test_utils::{fixtures, ManualClock, ScriptedUpstream};

pub struct Harness {
    pub upstream: Arc<ScriptedUpstream>,
    pub store: Arc<dyn PageStore>,
    pub clock: Arc<ManualClock>,
    pub service: Arc<KennelService>,
}

impl Harness {
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        self.service.scheduler()
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        self.scheduler().pipeline()
    }

    /// Store `page` and raise `total_pages` to cover it.
    pub async fn seed(&self, page: Page) {
        let number = page.number;
        self.store.replace_page(&page).await.expect("seed page");
        self.store.raise_total_pages(number).await.expect("seed total");
    }

    pub async fn page(&self, number: u32) -> Page {
        self.store
            .get_page(number)
            .await
            .expect("read page")
            .unwrap_or_else(|| Page::empty(number))
    }
}

pub struct HarnessBuilder {
    upstream: ScriptedUpstream,
    store: Option<Arc<dyn PageStore>>,
    retry: RetryConfig,
    ingest: IngestConfig,
    scheduler: SchedulerConfig,
}

impl HarnessBuilder {
    pub fn store(mut self, store: Arc<dyn PageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn ingest(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn build(self) -> Harness {
        let upstream = Arc::new(self.upstream);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryPageStore::new()));
        let clock = Arc::new(ManualClock::new(
            chrono::Utc
                .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
        ));
        let service = assemble(
            upstream.clone(),
            Arc::clone(&store),
            clock.clone(),
            &self.retry,
            self.ingest,
            self.scheduler,
        );
        Harness {
            upstream,
            store,
            clock,
            service,
        }
    }
}

pub fn harness(upstream: ScriptedUpstream) -> HarnessBuilder {
    HarnessBuilder {
        upstream,
        store: None,
        retry: fixtures::fast_retry(),
        ingest: fixtures::ingest(),
        scheduler: SchedulerConfig::default(),
    }
}
