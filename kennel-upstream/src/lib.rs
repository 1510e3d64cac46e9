//! Kennel Upstream - Page Source Client and Resilient Fetching
//!
//! The upstream is a paginated JSON endpoint that fails transiently and is
//! not idempotent. This crate provides:
//!
//! - [`UpstreamSource`]: a single fetch attempt, with error classification
//! - [`HttpUpstream`]: the reqwest implementation
//! - [`RetryPolicy`]: pure backoff decisions, testable without a network
//! - [`ResilientFetcher`]: timeout + retry loop with per-attempt logging

pub mod client;
pub mod fetcher;
pub mod retry;
pub mod source;

pub use client::{parse_page, HttpUpstream};
pub use fetcher::{FetchFailure, ResilientFetcher};
pub use retry::{equal_jitter, RetryDecision, RetryPolicy};
pub use source::UpstreamSource;
