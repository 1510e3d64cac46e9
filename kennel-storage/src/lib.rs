//! Kennel Storage - Page Store Trait and Backends
//!
//! Defines the [`PageStore`] abstraction and two implementations:
//! [`LmdbPageStore`] for durable storage across restarts and
//! [`InMemoryPageStore`] for tests and ephemeral deployments.

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbPageStore, LmdbStoreError};
pub use memory::InMemoryPageStore;
pub use traits::PageStore;
