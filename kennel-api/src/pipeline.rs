//! Ingestion pipeline: Fetcher -> Validator -> PageStore over a page range.
//!
//! Pages are processed one at a time. A page's cached content is only ever
//! replaced by a non-empty, validated result; every other outcome (terminal
//! fetch failure, all records rejected, confirmed-empty response, write
//! failure) leaves it untouched.
//!
//! A run can be interrupted by shutdown or by its wall-clock deadline. Both
//! are observed between pages and while a fetch is in flight. The in-flight
//! fetch is dropped in that case; the store write itself is never raced, so
//! an interrupted page is either fully written or not written at all.

use std::sync::Arc;

use kennel_core::{
    validate_page, Clock, IngestConfig, Page, PageNumber, RunKind, RunSummary, StopReason,
    PAGE_SIZE,
};
use kennel_storage::PageStore;
use kennel_upstream::{FetchFailure, ResilientFetcher};
use tokio::sync::watch;
use tokio::time::Instant;

/// Pages a run walks. `last: None` means open-ended (stops on end-of-data,
/// consecutive failures, or the page ceiling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub first: PageNumber,
    pub last: Option<PageNumber>,
}

impl PageRange {
    pub fn bounded(first: PageNumber, last: PageNumber) -> Self {
        Self {
            first,
            last: Some(last),
        }
    }

    pub fn open(first: PageNumber) -> Self {
        Self { first, last: None }
    }

    pub fn is_open_ended(&self) -> bool {
        self.last.is_none()
    }
}

/// What happened to one page.
#[derive(Debug)]
enum PageOutcome {
    Stored { accepted: usize, rejected: usize },
    Empty,
    AllRejected { rejected: usize },
    FetchFailed(FetchFailure),
    WriteFailed { rejected: usize, error: String },
}

/// Result of the fetch + validate half of a page, before any write.
enum Prepared {
    Ready { page: Page, rejected: usize },
    Empty,
    AllRejected { rejected: usize },
    Failed(FetchFailure),
}

/// Orchestrates fetch, validation and store writes for one run at a time.
///
/// The pipeline itself does not enforce mutual exclusion; callers go through
/// the scheduler's run-lock.
pub struct IngestionPipeline {
    fetcher: ResilientFetcher,
    store: Arc<dyn PageStore>,
    clock: Arc<dyn Clock>,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(
        fetcher: ResilientFetcher,
        store: Arc<dyn PageStore>,
        clock: Arc<dyn Clock>,
        config: IngestConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }

    /// Quick warm-up: pages `1..=warmup_pages`.
    pub async fn warmup(&self, shutdown: watch::Receiver<bool>) -> RunSummary {
        let last = self.config.warmup_pages.min(self.config.max_pages).max(1);
        self.run(RunKind::Warmup, PageRange::bounded(1, last), shutdown)
            .await
    }

    /// Full backfill: page 1 onward until the end of the dataset is inferred.
    pub async fn backfill(&self, shutdown: watch::Receiver<bool>) -> RunSummary {
        self.run(RunKind::Backfill, PageRange::open(1), shutdown).await
    }

    /// Re-scan `1..=total_pages` plus a few probe pages past it.
    pub async fn refresh(&self, kind: RunKind, shutdown: watch::Receiver<bool>) -> RunSummary {
        let known = self.known_total_pages().await;
        let last = known
            .saturating_add(self.config.refresh_probe_pages)
            .max(1);
        self.run(kind, PageRange::bounded(1, last), shutdown).await
    }

    /// Run whichever range `kind` calls for.
    pub async fn run_kind(&self, kind: RunKind, shutdown: watch::Receiver<bool>) -> RunSummary {
        match kind {
            RunKind::Warmup => self.warmup(shutdown).await,
            RunKind::Backfill => self.backfill(shutdown).await,
            RunKind::Refresh | RunKind::Manual => self.refresh(kind, shutdown).await,
        }
    }

    /// Process `range` page by page and return the run summary.
    ///
    /// Never fails: per-page problems are recorded in the summary.
    pub async fn run(
        &self,
        kind: RunKind,
        range: PageRange,
        mut shutdown: watch::Receiver<bool>,
    ) -> RunSummary {
        let total_before = self.known_total_pages().await;
        let mut summary = RunSummary::begin(kind, total_before, self.clock.now());
        let deadline = self.config.run_timeout.map(|t| Instant::now() + t);
        let ceiling = range
            .last
            .map_or(self.config.max_pages, |last| last.min(self.config.max_pages));

        tracing::info!(
            run_id = %summary.run_id,
            kind = %kind,
            first = range.first,
            last = ceiling,
            open_ended = range.is_open_ended(),
            total_pages_before = total_before,
            "Ingestion run started"
        );

        let mut page = range.first;
        let mut consecutive_empty: u32 = 0;
        let mut consecutive_failures: u32 = 0;

        let stop_reason = loop {
            if page > ceiling {
                break if range.is_open_ended() {
                    StopReason::PageCeiling
                } else {
                    StopReason::RangeExhausted
                };
            }
            if *shutdown.borrow() {
                break StopReason::Shutdown;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break StopReason::Deadline;
            }

            let prepared = tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => Err(StopReason::Shutdown),
                _ = deadline_elapsed(deadline) => Err(StopReason::Deadline),
                prepared = self.prepare_page(page) => Ok(prepared),
            };
            let prepared = match prepared {
                Ok(prepared) => prepared,
                Err(reason) => {
                    tracing::info!(
                        run_id = %summary.run_id,
                        page,
                        reason = %reason,
                        "In-flight fetch abandoned, page left untouched"
                    );
                    break reason;
                }
            };

            summary.pages_attempted += 1;
            let outcome = self.commit(prepared).await;
            self.record(&mut summary, page, &outcome);

            match outcome {
                PageOutcome::Stored { .. } => {
                    consecutive_empty = 0;
                    consecutive_failures = 0;
                }
                PageOutcome::Empty => {
                    consecutive_failures = 0;
                    // End detection only past the range known at run start.
                    if page > total_before {
                        consecutive_empty += 1;
                    } else {
                        consecutive_empty = 0;
                    }
                }
                PageOutcome::AllRejected { .. }
                | PageOutcome::FetchFailed(_)
                | PageOutcome::WriteFailed { .. } => {
                    consecutive_empty = 0;
                    consecutive_failures += 1;
                }
            }

            if consecutive_empty >= self.config.empty_pages_to_stop {
                break StopReason::EndOfData;
            }
            if range.is_open_ended() && consecutive_failures >= self.config.max_consecutive_failures {
                break StopReason::ConsecutiveFailures;
            }

            page += 1;
        };

        summary.total_pages_after = self.settle_total_pages(total_before).await;
        summary.stop_reason = stop_reason;
        summary.finished_at = self.clock.now();

        tracing::info!(
            run_id = %summary.run_id,
            kind = %kind,
            stop_reason = %summary.stop_reason,
            pages_attempted = summary.pages_attempted,
            pages_succeeded = summary.pages_succeeded,
            pages_failed = summary.pages_failed(),
            failed_pages = ?summary.failed_pages,
            empty_pages = ?summary.empty_pages,
            records_accepted = summary.records_accepted,
            records_rejected = summary.records_rejected,
            total_pages_before = summary.total_pages_before,
            total_pages_after = summary.total_pages_after,
            duration_ms = summary.duration().as_millis() as u64,
            "Ingestion run finished"
        );

        summary
    }

    /// Fetch and validate one page without touching the store.
    ///
    /// An empty response is re-fetched until it has come back empty
    /// `empty_page_confirmations` times; the first non-empty re-fetch wins.
    async fn prepare_page(&self, page: PageNumber) -> Prepared {
        let mut empties: u32 = 0;
        let raws = loop {
            match self.fetcher.fetch_page(page).await {
                Err(failure) => return Prepared::Failed(failure),
                Ok(raws) if raws.is_empty() => {
                    empties += 1;
                    if empties >= self.config.empty_page_confirmations {
                        return Prepared::Empty;
                    }
                    tracing::debug!(page, empties, "Empty response, confirming");
                }
                Ok(raws) => break raws,
            }
        };

        let mut validation = validate_page(&raws);
        let mut rejected = validation.rejected.len();
        if validation.accepted.len() > PAGE_SIZE {
            rejected += validation.accepted.len() - PAGE_SIZE;
            validation.accepted.truncate(PAGE_SIZE);
        }
        for rejection in &validation.rejected {
            tracing::debug!(page, %rejection, "Record rejected");
        }

        if validation.accepted.is_empty() {
            return Prepared::AllRejected { rejected };
        }

        Prepared::Ready {
            page: Page::new(page, validation.accepted, self.clock.now()),
            rejected,
        }
    }

    async fn commit(&self, prepared: Prepared) -> PageOutcome {
        match prepared {
            Prepared::Ready { page, rejected } => match self.store.replace_page(&page).await {
                Ok(()) => PageOutcome::Stored {
                    accepted: page.len(),
                    rejected,
                },
                Err(e) => PageOutcome::WriteFailed {
                    rejected,
                    error: e.to_string(),
                },
            },
            Prepared::Empty => PageOutcome::Empty,
            Prepared::AllRejected { rejected } => PageOutcome::AllRejected { rejected },
            Prepared::Failed(failure) => PageOutcome::FetchFailed(failure),
        }
    }

    fn record(&self, summary: &mut RunSummary, page: PageNumber, outcome: &PageOutcome) {
        let run_id = summary.run_id;
        match outcome {
            PageOutcome::Stored { accepted, rejected } => {
                summary.pages_succeeded += 1;
                summary.records_accepted += *accepted as u64;
                summary.records_rejected += *rejected as u64;
                tracing::info!(%run_id, page, outcome = "stored", accepted, rejected, "Page replaced");
            }
            PageOutcome::Empty => {
                summary.empty_pages.push(page);
                tracing::info!(%run_id, page, outcome = "empty", "Page confirmed empty, cache untouched");
            }
            PageOutcome::AllRejected { rejected } => {
                summary.failed_pages.push(page);
                summary.records_rejected += *rejected as u64;
                tracing::warn!(
                    %run_id,
                    page,
                    outcome = "all_rejected",
                    rejected,
                    "Every record rejected, cached content kept"
                );
            }
            PageOutcome::FetchFailed(failure) => {
                summary.failed_pages.push(page);
                tracing::warn!(
                    %run_id,
                    page,
                    outcome = "fetch_failed",
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "Fetch failed, cached content kept"
                );
            }
            PageOutcome::WriteFailed { rejected, error } => {
                summary.failed_pages.push(page);
                summary.records_rejected += *rejected as u64;
                tracing::error!(
                    %run_id,
                    page,
                    outcome = "write_failed",
                    error = %error,
                    "Store write failed, continuing with next page"
                );
            }
        }
    }

    /// Raise `total_pages` to the highest populated page and return it.
    async fn settle_total_pages(&self, total_before: PageNumber) -> PageNumber {
        let highest = match self.store.highest_populated_page().await {
            Ok(highest) => highest.unwrap_or(0),
            Err(e) => {
                tracing::error!(error = %e, "Failed to list cached pages");
                return total_before;
            }
        };
        match self.store.raise_total_pages(highest).await {
            Ok(total) => total,
            Err(e) => {
                tracing::error!(error = %e, candidate = highest, "Failed to update total_pages");
                total_before
            }
        }
    }

    async fn known_total_pages(&self) -> PageNumber {
        match self.store.total_pages().await {
            Ok(total) => total,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read total_pages, assuming 0");
                0
            }
        }
    }
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("fetcher", &self.fetcher)
            .field("config", &self.config)
            .finish()
    }
}

/// Resolves once shutdown is signalled; never if the sender is gone.
pub(crate) async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Shutdown receiver that never fires, for one-off runs outside the scheduler.
pub fn never_shutdown() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}
