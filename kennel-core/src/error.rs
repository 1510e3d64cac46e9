//! Error types for kennel operations

use std::time::Duration;
use thiserror::Error;

use crate::PageNumber;

/// Upstream (third-party page source) errors.
///
/// Every variant carries enough context to decide whether the request is
/// worth repeating; see [`UpstreamError::is_transient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Request for page {page} timed out after {elapsed:?}")]
    Timeout { page: PageNumber, elapsed: Duration },

    #[error("Connection to upstream failed for page {page}: {reason}")]
    Connect { page: PageNumber, reason: String },

    #[error("Upstream returned status {status} for page {page}")]
    Status {
        page: PageNumber,
        status: u16,
        /// Server-requested delay before the next attempt, if any.
        retry_after: Option<Duration>,
    },

    #[error("Malformed payload for page {page}: {reason}")]
    Malformed { page: PageNumber, reason: String },

    #[error("Transport error for page {page}: {reason}")]
    Transport { page: PageNumber, reason: String },
}

impl UpstreamError {
    /// Status codes this upstream is known to emit spuriously.
    ///
    /// 403 and 400 are normally definitive, but this source returns them
    /// intermittently for requests that succeed moments later.
    pub const UNSTABLE_STATUS_CODES: [u16; 2] = [400, 403];

    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } | Self::Malformed { .. } => true,
            Self::Status { status, .. } => {
                *status >= 500 || *status == 429 || Self::UNSTABLE_STATUS_CODES.contains(status)
            }
            Self::Transport { .. } => false,
        }
    }

    /// Page the failed request targeted.
    pub fn page(&self) -> PageNumber {
        match self {
            Self::Timeout { page, .. }
            | Self::Connect { page, .. }
            | Self::Status { page, .. }
            | Self::Malformed { page, .. }
            | Self::Transport { page, .. } => *page,
        }
    }

    /// Server-provided retry hint, only ever present on status errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short machine-friendly label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connect { .. } => "connect",
            Self::Status { .. } => "status",
            Self::Malformed { .. } => "malformed",
            Self::Transport { .. } => "transport",
        }
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open store: {reason}")]
    Open { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed for page {page}: {reason}")]
    Serialization { page: PageNumber, reason: String },

    #[error("Corrupt entry for page {page}: {reason}")]
    Deserialization { page: PageNumber, reason: String },

    #[error("Refusing to store page {page} with no records")]
    EmptyPage { page: PageNumber },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Master error type for all kennel errors.
#[derive(Debug, Clone, Error)]
pub enum KennelError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for kennel operations.
pub type KennelResult<T> = Result<T, KennelError>;

// =============================================================================
// TESTS
// =============================================================================
