//! Run-lock: at most one ingestion run at a time.
//!
//! Acquisition never waits. A caller that finds the lock held is told so and
//! decides for itself whether to skip or retry later.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one run; releasing is dropping.
pub type RunPermit = OwnedMutexGuard<()>;

#[derive(Debug, Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<()>>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if it is free right now.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        Arc::clone(&self.inner).try_lock_owned().ok()
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
