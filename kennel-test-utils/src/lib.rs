//! Kennel Test Utilities
//!
//! Shared test infrastructure for the kennel workspace:
//! - A scripted upstream that replays per-page responses
//! - A manual clock and a store wrapper that fails on demand
//! - Record fixtures and fast configs
//! - Proptest generators for raw upstream records
//! - Assertions over page contents

pub use kennel_core::{
    Clock, IngestConfig, KennelError, KennelResult, Page, PageNumber, RawRecord, RetryConfig,
    StorageError, Timestamp, UpstreamError, ValidRecord,
};
pub use kennel_storage::{InMemoryPageStore, PageStore};
pub use kennel_upstream::UpstreamSource;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// SCRIPTED UPSTREAM
// ============================================================================

/// One scripted response for a single fetch attempt.
#[derive(Debug, Clone)]
pub enum Step {
    Records(Vec<RawRecord>),
    Fail(UpstreamError),
    /// Never answers; the fetcher's attempt timeout fires.
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<PageNumber, VecDeque<Step>>,
    standing: HashMap<PageNumber, Step>,
    calls: HashMap<PageNumber, u32>,
}

/// Upstream double driven by per-page scripts.
///
/// For each attempt on page N the next queued step is used; once the queue
/// is drained the page's standing response applies, and pages with neither
/// answer with an empty list.
#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    script: Mutex<Script>,
    latency: Option<Duration>,
    total_calls: AtomicU32,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long (tokio time) before answering every attempt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a one-shot step for the next attempt on `page`.
    pub fn push(&self, page: PageNumber, step: Step) -> &Self {
        self.lock().queued.entry(page).or_default().push_back(step);
        self
    }

    /// Set the response used for `page` whenever its queue is empty.
    pub fn always(&self, page: PageNumber, step: Step) -> &Self {
        self.lock().standing.insert(page, step);
        self
    }

    /// Standing response for every page in `pages`.
    pub fn always_range(&self, pages: impl IntoIterator<Item = PageNumber>, step: impl Fn(PageNumber) -> Step) -> &Self {
        let mut script = self.lock();
        for page in pages {
            script.standing.insert(page, step(page));
        }
        drop(script);
        self
    }

    pub fn calls_for(&self, page: PageNumber) -> u32 {
        self.lock().calls.get(&page).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Pages that were requested at least once, ascending.
    pub fn pages_requested(&self) -> Vec<PageNumber> {
        let mut pages: Vec<_> = self.lock().calls.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_step(&self, page: PageNumber) -> Step {
        let mut script = self.lock();
        *script.calls.entry(page).or_default() += 1;
        if let Some(step) = script.queued.get_mut(&page).and_then(VecDeque::pop_front) {
            return step;
        }
        script
            .standing
            .get(&page)
            .cloned()
            .unwrap_or_else(|| Step::Records(Vec::new()))
    }
}

#[async_trait]
impl UpstreamSource for ScriptedUpstream {
    async fn fetch_once(&self, page: PageNumber) -> Result<Vec<RawRecord>, UpstreamError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step(page);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match step {
            Step::Records(records) => Ok(records),
            Step::Fail(error) => Err(error),
            Step::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ============================================================================
// FAILING STORE
// ============================================================================

/// In-memory store whose writes fail for selected pages.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryPageStore,
    failing: Mutex<HashSet<PageNumber>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_for(&self, page: PageNumber) {
        self.failing.lock().unwrap_or_else(|p| p.into_inner()).insert(page);
    }

    pub fn heal(&self, page: PageNumber) {
        self.failing.lock().unwrap_or_else(|p| p.into_inner()).remove(&page);
    }
}

#[async_trait]
impl PageStore for FlakyStore {
    async fn get_page(&self, number: PageNumber) -> KennelResult<Option<Page>> {
        self.inner.get_page(number).await
    }

    async fn replace_page(&self, page: &Page) -> KennelResult<()> {
        let fail = self
            .failing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&page.number);
        if fail {
            return Err(StorageError::TransactionFailed {
                reason: format!("injected write failure for page {}", page.number),
            }
            .into());
        }
        self.inner.replace_page(page).await
    }

    async fn page_numbers(&self) -> KennelResult<Vec<PageNumber>> {
        self.inner.page_numbers().await
    }

    async fn total_pages(&self) -> KennelResult<PageNumber> {
        self.inner.total_pages().await
    }

    async fn raise_total_pages(&self, candidate: PageNumber) -> KennelResult<PageNumber> {
        self.inner.raise_total_pages(candidate).await
    }

    async fn stats(&self) -> KennelResult<kennel_core::CacheStats> {
        self.inner.stats().await
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Record fixtures and configs tuned for fast tests.

    use super::*;
    use serde_json::json;

    /// `count` distinct valid raw records named `{prefix} {i}`.
    pub fn raw_records(prefix: &str, count: usize) -> Vec<RawRecord> {
        (0..count)
            .map(|i| {
                json!({
                    "breed": format!("{prefix} {i}"),
                    "image": format!("https://images.example/{prefix}/{i}.jpg"),
                })
            })
            .collect()
    }

    /// A full page of valid raw records.
    pub fn full_page(prefix: &str) -> Vec<RawRecord> {
        raw_records(prefix, kennel_core::PAGE_SIZE)
    }

    /// Validated page content equivalent to [`raw_records`].
    pub fn valid_page(number: PageNumber, prefix: &str, count: usize) -> Page {
        let records = (0..count)
            .map(|i| ValidRecord {
                breed: format!("{prefix} {i}"),
                image: format!("https://images.example/{prefix}/{i}.jpg"),
            })
            .collect();
        Page::new(number, records, chrono::Utc::now())
    }

    /// Five attempts with short, jitter-free backoff.
    pub fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(80),
            jitter: false,
            attempt_timeout: Duration::from_secs(1),
        }
    }

    /// Default ingestion policy with no run deadline.
    pub fn ingest() -> IngestConfig {
        IngestConfig {
            run_timeout: None,
            ..IngestConfig::default()
        }
    }

    pub fn timeout(page: PageNumber) -> UpstreamError {
        UpstreamError::Timeout {
            page,
            elapsed: Duration::from_secs(1),
        }
    }

    pub fn server_error(page: PageNumber) -> UpstreamError {
        UpstreamError::Status {
            page,
            status: 503,
            retry_after: None,
        }
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for raw upstream records.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Breed names that always pass validation.
    pub fn arb_breed() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,12}( [A-Z][a-z]{2,12})?"
    }

    pub fn arb_valid_raw_record() -> impl Strategy<Value = RawRecord> {
        (arb_breed(), prop::option::of("[a-z]{3,10}")).prop_map(|(breed, image)| match image {
            Some(name) => json!({ "breed": breed, "image": format!("https://img.example/{name}.png") }),
            None => json!({ "breed": breed }),
        })
    }

    /// Records the validator must reject.
    pub fn arb_corrupt_raw_record() -> impl Strategy<Value = RawRecord> {
        prop_oneof![
            Just(json!({})),
            Just(json!({ "breed": "" })),
            Just(json!({ "breed": "   " })),
            Just(json!({ "breed": null })),
            Just(json!({ "breed": 42 })),
            Just(json!({ "breed": "undefined" })),
            Just(json!({ "breed": "N/A" })),
            Just(json!({ "breed": "https://evil.example/dog" })),
            Just(json!({ "breed": "photo.jpg" })),
            Just(Value::String("not an object".into())),
            "[a-z]{61,80}".prop_map(|long| json!({ "breed": long })),
        ]
    }

    /// A mixed page payload of up to 15 valid and corrupt records.
    pub fn arb_page_payload() -> impl Strategy<Value = Vec<RawRecord>> {
        prop::collection::vec(
            prop_oneof![3 => arb_valid_raw_record(), 1 => arb_corrupt_raw_record()],
            0..=kennel_core::PAGE_SIZE,
        )
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over stored pages.

    use super::*;

    /// Breed names of a page, in order.
    pub fn breeds(page: &Page) -> Vec<&str> {
        page.records.iter().map(|r| r.breed.as_str()).collect()
    }

    /// Assert that the stored page holds exactly `expected`'s records.
    #[track_caller]
    pub fn assert_same_records(actual: &Page, expected: &Page) {
        assert_eq!(
            actual.records, expected.records,
            "page {} content differs",
            actual.number
        );
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &KennelResult<T>) {
        match result {
            Err(KennelError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }
}
