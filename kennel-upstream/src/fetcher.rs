//! Resilient fetcher: one logical "get page N" with timeout, retry and backoff.

use std::sync::Arc;
use std::time::Duration;

use kennel_core::{PageNumber, RawRecord, RetryConfig, UpstreamError};
use thiserror::Error;
use tokio::time::Instant;

use crate::retry::{RetryDecision, RetryPolicy};
use crate::UpstreamSource;

/// A page whose retries were exhausted (or whose error was definitive).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page {page} failed after {attempts} attempt(s): {last_error}")]
pub struct FetchFailure {
    pub page: PageNumber,
    pub attempts: u32,
    pub last_error: UpstreamError,
}

/// Wraps an [`UpstreamSource`] with a per-attempt timeout and a [`RetryPolicy`].
///
/// Every attempt is logged with `page`, `attempt`, `outcome` and `latency_ms`.
#[derive(Clone)]
pub struct ResilientFetcher {
    source: Arc<dyn UpstreamSource>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl ResilientFetcher {
    pub fn new(source: Arc<dyn UpstreamSource>, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            source,
            policy,
            attempt_timeout,
        }
    }

    pub fn from_config(source: Arc<dyn UpstreamSource>, config: &RetryConfig) -> Self {
        Self::new(source, RetryPolicy::from_config(config), config.attempt_timeout)
    }

    /// Fetch one page, retrying transient failures.
    ///
    /// Returns the raw records (possibly none) or a [`FetchFailure`]; it never
    /// panics or propagates anything else.
    pub async fn fetch_page(&self, page: PageNumber) -> Result<Vec<RawRecord>, FetchFailure> {
        let mut attempt: u32 = 1;

        loop {
            let started = Instant::now();
            let result = match tokio::time::timeout(self.attempt_timeout, self.source.fetch_once(page)).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout {
                    page,
                    elapsed: started.elapsed(),
                }),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let error = match result {
                Ok(records) => {
                    tracing::info!(
                        page,
                        attempt,
                        outcome = "ok",
                        records = records.len(),
                        latency_ms,
                        "Fetch attempt succeeded"
                    );
                    return Ok(records);
                }
                Err(error) => error,
            };

            match self.policy.decide(attempt, &error) {
                RetryDecision::Retry { delay } => {
                    let delay = self.policy.jittered(delay);
                    tracing::warn!(
                        page,
                        attempt,
                        outcome = error.kind(),
                        latency_ms,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "Fetch attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(
                        page,
                        attempt,
                        outcome = error.kind(),
                        latency_ms,
                        transient = error.is_transient(),
                        error = %error,
                        "Fetch attempt failed, giving up"
                    );
                    return Err(FetchFailure {
                        page,
                        attempts: attempt,
                        last_error: error,
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("policy", &self.policy)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}
