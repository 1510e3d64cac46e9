//! Page store trait.
//!
//! A page store maps page numbers to the current validated record list for
//! that page, plus the monotonic `total_pages` watermark.
//!
//! # Consistency contract
//!
//! - `replace_page` swaps a page's whole value in one step. A concurrent
//!   `get_page` sees either the previous list or the new one, never a mix.
//! - Pages are never deleted and never stored empty.
//! - `raise_total_pages` only ever increases the stored value.

use async_trait::async_trait;
use kennel_core::{CacheStats, KennelResult, Page, PageNumber};

#[async_trait]
pub trait PageStore: Send + Sync {
    /// Get the current content of a page, or `None` if it was never populated.
    async fn get_page(&self, number: PageNumber) -> KennelResult<Option<Page>>;

    /// Atomically replace a page's content.
    ///
    /// Returns `StorageError::EmptyPage` for a page with no records, so a bad
    /// upstream response can never wipe previously good data.
    async fn replace_page(&self, page: &Page) -> KennelResult<()>;

    /// All populated page numbers, ascending.
    async fn page_numbers(&self) -> KennelResult<Vec<PageNumber>>;

    /// The stored `total_pages` watermark (0 for an empty store).
    async fn total_pages(&self) -> KennelResult<PageNumber>;

    /// Set `total_pages` to `max(current, candidate)` and return the result.
    async fn raise_total_pages(&self, candidate: PageNumber) -> KennelResult<PageNumber>;

    /// Aggregate statistics over every stored page.
    async fn stats(&self) -> KennelResult<CacheStats>;

    /// Highest populated page number, if any.
    async fn highest_populated_page(&self) -> KennelResult<Option<PageNumber>> {
        Ok(self.page_numbers().await?.into_iter().max())
    }

    async fn is_empty(&self) -> KennelResult<bool> {
        Ok(self.page_numbers().await?.is_empty())
    }
}
