//! Kennel Core - Data Model, Validation, Configuration
//!
//! Pure types shared by every other crate: the record and page model, the
//! validator, the error taxonomy, config structs, and the clock seam.
//! Nothing in here performs I/O.

pub mod clock;
pub mod config;
pub mod entities;
pub mod error;
pub mod run;
pub mod validate;

pub use clock::{Clock, SystemClock};
pub use config::{IngestConfig, RetryConfig, SchedulerConfig, StoreConfig, UpstreamConfig};
pub use entities::{CacheStats, Page, ValidRecord};
pub use error::{ConfigError, KennelError, KennelResult, StorageError, UpstreamError};
pub use run::{RunKind, RunSummary, StopReason};
pub use validate::{validate, validate_page, PageValidation, Rejection};

use chrono::{DateTime, Utc};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// 1-based upstream page number.
pub type PageNumber = u32;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// One entry of an upstream page, exactly as received. No invariants.
pub type RawRecord = serde_json::Value;

/// Contracted number of records per page.
pub const PAGE_SIZE: usize = 15;

/// Image value meaning "no image, use the presentation fallback".
pub const NO_IMAGE: &str = "";
