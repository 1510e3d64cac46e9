//! Wall-clock seam.
//!
//! Refresh timestamps and run summaries read time through [`Clock`] so tests
//! can pin it.

use crate::Timestamp;
use chrono::Utc;

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
