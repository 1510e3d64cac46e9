//! In-memory page store.
//!
//! Not durable. Pages are held as `Arc<Page>` so a replace is a single
//! pointer swap under the write lock and readers clone out a finished page.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use kennel_core::{CacheStats, KennelResult, Page, PageNumber, StorageError};

use super::traits::PageStore;

#[derive(Debug, Default)]
struct Inner {
    pages: BTreeMap<PageNumber, Arc<Page>>,
    total_pages: PageNumber,
}

/// Page store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryPageStore {
    inner: RwLock<Inner>,
}

impl InMemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PageStore for InMemoryPageStore {
    async fn get_page(&self, number: PageNumber) -> KennelResult<Option<Page>> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner.pages.get(&number).map(|page| Page::clone(page)))
    }

    async fn replace_page(&self, page: &Page) -> KennelResult<()> {
        if page.is_empty() {
            return Err(StorageError::EmptyPage { page: page.number }.into());
        }

        let mut stored = page.clone();
        stored.refreshed_at.get_or_insert_with(Utc::now);
        let stored = Arc::new(stored);

        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;
        inner.pages.insert(page.number, stored);
        Ok(())
    }

    async fn page_numbers(&self) -> KennelResult<Vec<PageNumber>> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner.pages.keys().copied().collect())
    }

    async fn total_pages(&self) -> KennelResult<PageNumber> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner.total_pages)
    }

    async fn raise_total_pages(&self, candidate: PageNumber) -> KennelResult<PageNumber> {
        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;
        inner.total_pages = inner.total_pages.max(candidate);
        Ok(inner.total_pages)
    }

    async fn stats(&self) -> KennelResult<CacheStats> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(CacheStats {
            total_pages: inner.total_pages,
            total_records: inner.pages.values().map(|p| p.len() as u64).sum(),
            last_refresh_at: inner.pages.values().filter_map(|p| p.refreshed_at).max(),
        })
    }
}
