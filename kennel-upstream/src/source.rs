//! Upstream source trait.

use std::sync::Arc;

use async_trait::async_trait;
use kennel_core::{PageNumber, RawRecord, UpstreamError};

/// One attempt at fetching one page from the upstream.
///
/// Implementations make a single request and classify its failure; retrying
/// and backoff belong to [`crate::ResilientFetcher`].
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    async fn fetch_once(&self, page: PageNumber) -> Result<Vec<RawRecord>, UpstreamError>;
}

#[async_trait]
impl<T: UpstreamSource + ?Sized> UpstreamSource for Arc<T> {
    async fn fetch_once(&self, page: PageNumber) -> Result<Vec<RawRecord>, UpstreamError> {
        (**self).fetch_once(page).await
    }
}
