//! Constants for the kennel API server.

use std::time::Duration;

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5000;

/// How often a pending backfill retries the run-lock while another run holds it.
pub const BACKFILL_LOCK_RETRY: Duration = Duration::from_secs(1);

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "kennel_api=info,kennel_upstream=info,kennel_storage=info,info";

/// Page served when the request omits `?page=`.
pub const DEFAULT_PAGE: u32 = 1;
