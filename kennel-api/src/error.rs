//! Error types for the kennel API binary.
//!
//! The read path never fails (see [`crate::KennelService`]), so these errors
//! only come out of start-up and serving: configuration, opening the store,
//! telemetry, binding and serving.

use kennel_core::KennelError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Kennel(#[from] KennelError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Failed to initialize telemetry: {0}")]
    Telemetry(String),
}

impl From<kennel_storage::LmdbStoreError> for ApiError {
    fn from(err: kennel_storage::LmdbStoreError) -> Self {
        ApiError::Kennel(err.into())
    }
}

/// Result type for API start-up and serving.
pub type ApiResult<T> = Result<T, ApiError>;
