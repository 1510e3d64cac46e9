//! LMDB-backed durable page store.
//!
//! Uses the heed crate (Rust bindings for LMDB) so the cache survives
//! process restarts and a restarted service can serve stable data before any
//! backfill completes.
//!
//! # Layout
//!
//! A single unnamed database holds two kinds of keys:
//! - `page/` + big-endian page number → `[refreshed_at millis: 8 bytes LE][json records]`
//! - `meta/total_pages` → big-endian `u32`
//!
//! Big-endian page keys keep LMDB's lexicographic order equal to numeric order.
//!
//! # Atomicity
//!
//! Each `replace_page` is one write transaction containing one `put`, and
//! each `get_page` reads inside one read transaction. LMDB's MVCC means a
//! reader sees either the committed old value or the committed new value.
//! Write transactions are serialized by LMDB, which also makes
//! `raise_total_pages` a safe read-modify-write.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use kennel_core::{
    CacheStats, KennelResult, Page, PageNumber, StorageError, Timestamp, ValidRecord,
};

use super::traits::PageStore;

const PAGE_PREFIX: &[u8] = b"page/";
const TOTAL_PAGES_KEY: &[u8] = b"meta/total_pages";

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to KennelError.
impl From<LmdbStoreError> for kennel_core::KennelError {
    fn from(e: LmdbStoreError) -> Self {
        let reason = e.to_string();
        let err = match e {
            LmdbStoreError::EnvOpen(_) | LmdbStoreError::DbOpen(_) | LmdbStoreError::Io(_) => {
                StorageError::Open { reason }
            }
            LmdbStoreError::Transaction(_) => StorageError::TransactionFailed { reason },
        };
        kennel_core::KennelError::Storage(err)
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// LMDB-backed page store.
///
/// # Example
///
/// ```ignore
/// use kennel_storage::{LmdbPageStore, PageStore};
///
/// let store = LmdbPageStore::open("./kennel-cache", 64)?;
/// store.replace_page(&page).await?;
/// let cached = store.get_page(3).await?;
/// ```
pub struct LmdbPageStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbPageStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the memory map is never modified outside heed.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        tracing::info!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB page store");

        Ok(Self { env, db })
    }

    fn page_key(number: PageNumber) -> Vec<u8> {
        let mut key = Vec::with_capacity(PAGE_PREFIX.len() + 4);
        key.extend_from_slice(PAGE_PREFIX);
        key.extend_from_slice(&number.to_be_bytes());
        key
    }

    fn decode_page_key(key: &[u8]) -> Option<PageNumber> {
        let suffix = key.strip_prefix(PAGE_PREFIX)?;
        let bytes: [u8; 4] = suffix.try_into().ok()?;
        Some(PageNumber::from_be_bytes(bytes))
    }

    fn encode_value(page: &Page, refreshed_at: Timestamp) -> KennelResult<Vec<u8>> {
        let json = serde_json::to_vec(&page.records).map_err(|e| StorageError::Serialization {
            page: page.number,
            reason: e.to_string(),
        })?;

        let mut bytes = Vec::with_capacity(8 + json.len());
        bytes.extend_from_slice(&refreshed_at.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&json);
        Ok(bytes)
    }

    fn decode_timestamp(number: PageNumber, bytes: &[u8]) -> KennelResult<Timestamp> {
        let header: [u8; 8] = bytes
            .get(0..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| StorageError::Deserialization {
                page: number,
                reason: "value shorter than timestamp header".to_string(),
            })?;
        let millis = i64::from_le_bytes(header);
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            StorageError::Deserialization {
                page: number,
                reason: format!("timestamp out of range: {millis}"),
            }
            .into()
        })
    }

    fn decode_value(number: PageNumber, bytes: &[u8]) -> KennelResult<Page> {
        let refreshed_at = Self::decode_timestamp(number, bytes)?;
        let records: Vec<ValidRecord> =
            serde_json::from_slice(&bytes[8..]).map_err(|e| StorageError::Deserialization {
                page: number,
                reason: e.to_string(),
            })?;
        Ok(Page {
            number,
            records,
            refreshed_at: Some(refreshed_at),
        })
    }

    fn read_total_pages(&self, rtxn: &RoTxn) -> Result<PageNumber, LmdbStoreError> {
        let value = self.db.get(rtxn, TOTAL_PAGES_KEY).map_err(txn_err)?;
        Ok(value
            .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
            .map(PageNumber::from_be_bytes)
            .unwrap_or(0))
    }

    /// Collect every `(page, raw value)` pair in key order.
    fn scan_pages(&self) -> Result<Vec<(PageNumber, Vec<u8>)>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let iter = self.db.iter(&rtxn).map_err(txn_err)?;

        let mut pages = Vec::new();
        for result in iter {
            let (key, value) = result.map_err(txn_err)?;
            if let Some(number) = Self::decode_page_key(key) {
                pages.push((number, value.to_vec()));
            }
        }
        Ok(pages)
    }
}

#[async_trait]
impl PageStore for LmdbPageStore {
    async fn get_page(&self, number: PageNumber) -> KennelResult<Option<Page>> {
        let key = Self::page_key(number);
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        match self.db.get(&rtxn, &key).map_err(txn_err)? {
            Some(bytes) => Ok(Some(Self::decode_value(number, bytes)?)),
            None => Ok(None),
        }
    }

    async fn replace_page(&self, page: &Page) -> KennelResult<()> {
        if page.is_empty() {
            return Err(StorageError::EmptyPage { page: page.number }.into());
        }

        let refreshed_at = page.refreshed_at.unwrap_or_else(Utc::now);
        let key = Self::page_key(page.number);
        let value = Self::encode_value(page, refreshed_at)?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db.put(&mut wtxn, &key, &value).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        tracing::debug!(page = page.number, records = page.len(), "Replaced cached page");
        Ok(())
    }

    async fn page_numbers(&self) -> KennelResult<Vec<PageNumber>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let iter = self.db.iter(&rtxn).map_err(txn_err)?;

        let mut numbers = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(txn_err)?;
            if let Some(number) = Self::decode_page_key(key) {
                numbers.push(number);
            }
        }
        Ok(numbers)
    }

    async fn total_pages(&self) -> KennelResult<PageNumber> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.read_total_pages(&rtxn)?)
    }

    async fn raise_total_pages(&self, candidate: PageNumber) -> KennelResult<PageNumber> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let current = self.read_total_pages(&wtxn)?;
        if candidate <= current {
            wtxn.abort();
            return Ok(current);
        }

        self.db
            .put(&mut wtxn, TOTAL_PAGES_KEY, &candidate.to_be_bytes())
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        tracing::info!(from = current, to = candidate, "Raised total_pages");
        Ok(candidate)
    }

    async fn stats(&self) -> KennelResult<CacheStats> {
        let total_pages = self.total_pages().await?;
        let mut stats = CacheStats {
            total_pages,
            ..CacheStats::default()
        };

        // total_pages stands on its own; unreadable pages only shrink the counts.
        let pages = match self.scan_pages() {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!(error = %e, "Page scan failed, reporting total_pages only");
                return Ok(stats);
            }
        };
        for (number, bytes) in pages {
            match Self::decode_value(number, &bytes) {
                Ok(page) => {
                    stats.total_records += page.len() as u64;
                    stats.last_refresh_at = stats.last_refresh_at.max(page.refreshed_at);
                }
                Err(e) => tracing::warn!(page = number, error = %e, "Skipping undecodable page in stats"),
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kennel_core::{KennelError, NO_IMAGE};
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbPageStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbPageStore::open(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    fn make_page(number: PageNumber, prefix: &str, count: usize) -> Page {
        let records = (0..count)
            .map(|i| ValidRecord {
                breed: format!("{prefix}-{i}"),
                image: if i % 2 == 0 {
                    format!("https://img.example/{prefix}-{i}.jpg")
                } else {
                    NO_IMAGE.to_string()
                },
            })
            .collect();
        Page::new(number, records, Utc::now())
    }

    #[tokio::test]
    async fn test_replace_and_get() {
        let (store, _temp_dir) = create_test_store();
        let page = make_page(3, "hound", 15);

        store.replace_page(&page).await.expect("replace should succeed");

        let cached = store
            .get_page(3)
            .await
            .expect("get should succeed")
            .expect("page should exist");
        assert_eq!(cached.records, page.records);
        assert_eq!(cached.number, 3);
        let written = page.refreshed_at.expect("set");
        let read = cached.refreshed_at.expect("set");
        assert!((written - read).num_milliseconds().abs() <= 1);
    }

    #[tokio::test]
    async fn test_get_missing_page() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get_page(9).await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_replace_is_full_not_merge() {
        let (store, _temp_dir) = create_test_store();
        store.replace_page(&make_page(2, "old", 15)).await.expect("replace");
        store.replace_page(&make_page(2, "new", 4)).await.expect("replace");

        let cached = store.get_page(2).await.expect("get").expect("exists");
        assert_eq!(cached.len(), 4);
        assert!(cached.records.iter().all(|r| r.breed.starts_with("new-")));
    }

    #[tokio::test]
    async fn test_empty_page_refused() {
        let (store, _temp_dir) = create_test_store();
        store.replace_page(&make_page(1, "kept", 3)).await.expect("replace");

        let result = store.replace_page(&Page::new(1, Vec::new(), Utc::now())).await;
        assert!(matches!(
            result,
            Err(KennelError::Storage(StorageError::EmptyPage { page: 1 }))
        ));

        let cached = store.get_page(1).await.expect("get").expect("exists");
        assert_eq!(cached.len(), 3);
    }

    #[tokio::test]
    async fn test_total_pages_is_monotonic() {
        let (store, _temp_dir) = create_test_store();
        assert_eq!(store.total_pages().await.expect("total"), 0);
        assert_eq!(store.raise_total_pages(12).await.expect("raise"), 12);
        assert_eq!(store.raise_total_pages(4).await.expect("raise"), 12);
        assert_eq!(store.raise_total_pages(13).await.expect("raise"), 13);
        assert_eq!(store.total_pages().await.expect("total"), 13);
    }

    #[tokio::test]
    async fn test_page_numbers_sorted_numerically() {
        let (store, _temp_dir) = create_test_store();
        for n in [300, 2, 1, 40] {
            store.replace_page(&make_page(n, "p", 1)).await.expect("replace");
        }
        assert_eq!(store.page_numbers().await.expect("numbers"), vec![1, 2, 40, 300]);
        assert_eq!(store.highest_populated_page().await.expect("highest"), Some(300));
        assert!(!store.is_empty().await.expect("is_empty"));
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, _temp_dir) = create_test_store();
        let older = Page::new(1, make_page(1, "a", 15).records, Utc::now() - chrono::Duration::minutes(5));
        let newer = make_page(2, "b", 6);
        store.replace_page(&older).await.expect("replace");
        store.replace_page(&newer).await.expect("replace");
        store.raise_total_pages(2).await.expect("raise");

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.total_pages, 2);
        assert_eq!(stats.total_records, 21);
        let last = stats.last_refresh_at.expect("set");
        let expected = newer.refreshed_at.expect("set");
        assert!((last - expected).num_milliseconds().abs() <= 1);
    }

    #[tokio::test]
    async fn test_stats_skip_undecodable_page() {
        let (store, _temp_dir) = create_test_store();
        store.replace_page(&make_page(1, "good", 15)).await.expect("replace");
        store.raise_total_pages(3).await.expect("raise");

        let mut wtxn = store.env.write_txn().expect("write txn");
        store
            .db
            .put(&mut wtxn, &LmdbPageStore::page_key(2), b"garbage")
            .expect("put corrupt value");
        wtxn.commit().expect("commit");

        let stats = store.stats().await.expect("stats still served");
        assert_eq!(stats.total_pages, 3);
        assert_eq!(stats.total_records, 15);
        assert!(stats.last_refresh_at.is_some());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = LmdbPageStore::open(temp_dir.path(), 10).expect("open");
            store.replace_page(&make_page(5, "durable", 15)).await.expect("replace");
            store.raise_total_pages(5).await.expect("raise");
        }

        let reopened = LmdbPageStore::open(temp_dir.path(), 10).expect("reopen");
        let cached = reopened.get_page(5).await.expect("get").expect("persisted");
        assert_eq!(cached.len(), 15);
        assert_eq!(reopened.total_pages().await.expect("total"), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_reader_sees_whole_page() {
        let (store, _temp_dir) = create_test_store();
        let store = std::sync::Arc::new(store);
        store.replace_page(&make_page(1, "old", 15)).await.expect("seed");

        let writer = {
            let store = std::sync::Arc::clone(&store);
            tokio::spawn(async move {
                for round in 0..200 {
                    let prefix = if round % 2 == 0 { "new" } else { "old" };
                    store
                        .replace_page(&make_page(1, prefix, 15))
                        .await
                        .expect("replace");
                }
            })
        };

        for _ in 0..500 {
            let page = store.get_page(1).await.expect("get").expect("exists");
            assert_eq!(page.len(), 15);
            let first = page.records[0].breed.split('-').next().map(str::to_string);
            assert!(
                page.records
                    .iter()
                    .all(|r| r.breed.split('-').next().map(str::to_string) == first),
                "reader observed a mixed page"
            );
        }

        writer.await.expect("writer task");
    }
}
