//! Ingestion run bookkeeping.
//!
//! A [`RunSummary`] is built up page by page while a run executes and is
//! only ever logged or handed back to the caller; it is never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::{PageNumber, Timestamp};

/// Which job started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// First few pages, synchronously before serving.
    Warmup,
    /// One-time walk from page 1 to the inferred end of the dataset.
    Backfill,
    /// Recurring re-scan of the known page range.
    Refresh,
    /// Out-of-cycle refresh requested by an operator.
    Manual,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Warmup => "warmup",
            RunKind::Backfill => "backfill",
            RunKind::Refresh => "refresh",
            RunKind::Manual => "manual",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run stopped walking pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every page in a bounded range was processed.
    RangeExhausted,
    /// Consecutive confirmed-empty pages past the known range.
    EndOfData,
    /// The configured page ceiling was reached.
    PageCeiling,
    /// Too many consecutive pages failed terminally.
    ConsecutiveFailures,
    /// The run exceeded its wall-clock budget.
    Deadline,
    /// Shutdown was signalled.
    Shutdown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::RangeExhausted => "range_exhausted",
            StopReason::EndOfData => "end_of_data",
            StopReason::PageCeiling => "page_ceiling",
            StopReason::ConsecutiveFailures => "consecutive_failures",
            StopReason::Deadline => "deadline",
            StopReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub pages_attempted: u32,
    pub pages_succeeded: u32,
    /// Pages whose cached content was left untouched because the fetch
    /// failed, every record was rejected, or the write failed.
    pub failed_pages: Vec<PageNumber>,
    /// Pages confirmed empty by the upstream.
    pub empty_pages: Vec<PageNumber>,
    pub records_accepted: u64,
    pub records_rejected: u64,
    /// `total_pages` before and after the run.
    pub total_pages_before: PageNumber,
    pub total_pages_after: PageNumber,
    pub stop_reason: StopReason,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl RunSummary {
    /// Start a summary for a run beginning at `started_at`.
    pub fn begin(kind: RunKind, total_pages_before: PageNumber, started_at: Timestamp) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            kind,
            pages_attempted: 0,
            pages_succeeded: 0,
            failed_pages: Vec::new(),
            empty_pages: Vec::new(),
            records_accepted: 0,
            records_rejected: 0,
            total_pages_before,
            total_pages_after: total_pages_before,
            stop_reason: StopReason::RangeExhausted,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn pages_failed(&self) -> u32 {
        self.failed_pages.len() as u32
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// True when every attempted page either succeeded or was confirmed empty.
    pub fn is_clean(&self) -> bool {
        self.failed_pages.is_empty()
    }
}
