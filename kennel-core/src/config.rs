//! Configuration types
//!
//! Every config struct has a `Default` carrying production values and a
//! `from_env()` constructor reading `KENNEL_*` variables; unparseable values
//! fall back to the default. `validate()` rejects combinations that cannot
//! work.

use crate::{ConfigError, KennelResult, PageNumber};
use std::str::FromStr;
use std::time::Duration;

/// Default upstream endpoint; pages are requested as `?page=N`.
pub const DEFAULT_UPSTREAM_URL: &str = "https://interview-api-olive.vercel.app/api/dogs";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_WARMUP_PAGES: PageNumber = 5;
pub const DEFAULT_MAX_PAGES: PageNumber = 50;
pub const DEFAULT_EMPTY_PAGES_TO_STOP: u32 = 2;
pub const DEFAULT_EMPTY_PAGE_CONFIRMATIONS: u32 = 2;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;
pub const DEFAULT_REFRESH_PROBE_PAGES: PageNumber = 2;
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 900;

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

pub const DEFAULT_CACHE_DIR: &str = "./kennel-cache";
pub const DEFAULT_CACHE_MAX_MB: usize = 64;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// UPSTREAM
// ============================================================================

/// Where and how to reach the upstream page source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            user_agent: format!("kennel/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl UpstreamConfig {
    /// # Environment Variables
    /// - `KENNEL_UPSTREAM_URL`: Page source endpoint
    /// - `KENNEL_USER_AGENT`: User-Agent header sent upstream
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("KENNEL_UPSTREAM_URL").unwrap_or(defaults.base_url),
            user_agent: std::env::var("KENNEL_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    pub fn validate(&self) -> KennelResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(invalid("base_url", &self.base_url, "must be an http(s) URL").into());
        }
        Ok(())
    }
}

// ============================================================================
// RETRY
// ============================================================================

/// Per-page retry and timeout policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts per page, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
    /// Randomize each delay within `[delay / 2, delay]`.
    pub jitter: bool,
    /// Bound on a single network attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: true,
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
        }
    }
}

impl RetryConfig {
    /// # Environment Variables
    /// - `KENNEL_RETRY_MAX_ATTEMPTS` (default: 5)
    /// - `KENNEL_RETRY_BASE_DELAY_MS` (default: 500)
    /// - `KENNEL_RETRY_MAX_DELAY_MS` (default: 8000)
    /// - `KENNEL_RETRY_JITTER` (default: true)
    /// - `KENNEL_ATTEMPT_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Self {
        Self {
            max_attempts: env_or("KENNEL_RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            base_delay: Duration::from_millis(env_or(
                "KENNEL_RETRY_BASE_DELAY_MS",
                DEFAULT_BASE_DELAY_MS,
            )),
            max_delay: Duration::from_millis(env_or(
                "KENNEL_RETRY_MAX_DELAY_MS",
                DEFAULT_MAX_DELAY_MS,
            )),
            jitter: env_flag("KENNEL_RETRY_JITTER", true),
            attempt_timeout: Duration::from_secs(env_or(
                "KENNEL_ATTEMPT_TIMEOUT_SECS",
                DEFAULT_ATTEMPT_TIMEOUT_SECS,
            )),
        }
    }

    pub fn validate(&self) -> KennelResult<()> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", self.max_attempts, "must be at least 1").into());
        }
        if self.attempt_timeout.is_zero() {
            return Err(invalid("attempt_timeout", "0s", "must be positive").into());
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::IncompatibleOptions {
                option_a: format!("base_delay={:?}", self.base_delay),
                option_b: format!("max_delay={:?}", self.max_delay),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// INGESTION
// ============================================================================

/// Page-walking policy for ingestion runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Pages fetched synchronously before serving starts.
    pub warmup_pages: PageNumber,
    /// Highest page any run will request.
    pub max_pages: PageNumber,
    /// Consecutive confirmed-empty pages that end an open-ended walk.
    pub empty_pages_to_stop: u32,
    /// Fetches that must come back empty before a page counts as empty.
    pub empty_page_confirmations: u32,
    /// Consecutive terminal page failures that abort an open-ended walk.
    pub max_consecutive_failures: u32,
    /// Pages past `total_pages` a refresh probes for dataset growth.
    pub refresh_probe_pages: PageNumber,
    /// Wall-clock budget for one run.
    pub run_timeout: Option<Duration>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            warmup_pages: DEFAULT_WARMUP_PAGES,
            max_pages: DEFAULT_MAX_PAGES,
            empty_pages_to_stop: DEFAULT_EMPTY_PAGES_TO_STOP,
            empty_page_confirmations: DEFAULT_EMPTY_PAGE_CONFIRMATIONS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            refresh_probe_pages: DEFAULT_REFRESH_PROBE_PAGES,
            run_timeout: Some(Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS)),
        }
    }
}

impl IngestConfig {
    /// # Environment Variables
    /// - `KENNEL_WARMUP_PAGES` (default: 5)
    /// - `KENNEL_MAX_PAGES` (default: 50)
    /// - `KENNEL_EMPTY_PAGES_TO_STOP` (default: 2)
    /// - `KENNEL_EMPTY_PAGE_CONFIRMATIONS` (default: 2)
    /// - `KENNEL_MAX_CONSECUTIVE_FAILURES` (default: 10)
    /// - `KENNEL_REFRESH_PROBE_PAGES` (default: 2)
    /// - `KENNEL_RUN_TIMEOUT_SECS` (default: 900, `0` disables)
    pub fn from_env() -> Self {
        let run_timeout_secs = env_or("KENNEL_RUN_TIMEOUT_SECS", DEFAULT_RUN_TIMEOUT_SECS);
        Self {
            warmup_pages: env_or("KENNEL_WARMUP_PAGES", DEFAULT_WARMUP_PAGES),
            max_pages: env_or("KENNEL_MAX_PAGES", DEFAULT_MAX_PAGES),
            empty_pages_to_stop: env_or("KENNEL_EMPTY_PAGES_TO_STOP", DEFAULT_EMPTY_PAGES_TO_STOP),
            empty_page_confirmations: env_or(
                "KENNEL_EMPTY_PAGE_CONFIRMATIONS",
                DEFAULT_EMPTY_PAGE_CONFIRMATIONS,
            ),
            max_consecutive_failures: env_or(
                "KENNEL_MAX_CONSECUTIVE_FAILURES",
                DEFAULT_MAX_CONSECUTIVE_FAILURES,
            ),
            refresh_probe_pages: env_or("KENNEL_REFRESH_PROBE_PAGES", DEFAULT_REFRESH_PROBE_PAGES),
            run_timeout: (run_timeout_secs > 0).then(|| Duration::from_secs(run_timeout_secs)),
        }
    }

    pub fn validate(&self) -> KennelResult<()> {
        if self.max_pages == 0 {
            return Err(invalid("max_pages", self.max_pages, "must be at least 1").into());
        }
        if self.empty_pages_to_stop == 0 {
            return Err(invalid(
                "empty_pages_to_stop",
                self.empty_pages_to_stop,
                "must be at least 1",
            )
            .into());
        }
        if self.empty_page_confirmations == 0 {
            return Err(invalid(
                "empty_page_confirmations",
                self.empty_page_confirmations,
                "must be at least 1",
            )
            .into());
        }
        if self.max_consecutive_failures == 0 {
            return Err(invalid(
                "max_consecutive_failures",
                self.max_consecutive_failures,
                "must be at least 1",
            )
            .into());
        }
        if self.warmup_pages > self.max_pages {
            return Err(ConfigError::IncompatibleOptions {
                option_a: format!("warmup_pages={}", self.warmup_pages),
                option_b: format!("max_pages={}", self.max_pages),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Background scheduler timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub refresh_interval: Duration,
    /// How long shutdown waits for background tasks before abandoning them.
    pub shutdown_grace: Duration,
    /// Run the start-up warm-up even when the store already holds pages.
    pub warmup_when_populated: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            warmup_when_populated: false,
        }
    }
}

impl SchedulerConfig {
    /// # Environment Variables
    /// - `KENNEL_REFRESH_INTERVAL_SECS` (default: 600)
    /// - `KENNEL_SHUTDOWN_GRACE_SECS` (default: 5)
    /// - `KENNEL_WARMUP_WHEN_POPULATED` (default: false)
    pub fn from_env() -> Self {
        Self {
            refresh_interval: Duration::from_secs(env_or(
                "KENNEL_REFRESH_INTERVAL_SECS",
                DEFAULT_REFRESH_INTERVAL_SECS,
            )),
            shutdown_grace: Duration::from_secs(env_or(
                "KENNEL_SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )),
            warmup_when_populated: env_flag("KENNEL_WARMUP_WHEN_POPULATED", false),
        }
    }

    pub fn validate(&self) -> KennelResult<()> {
        if self.refresh_interval.is_zero() {
            return Err(invalid("refresh_interval", "0s", "must be positive").into());
        }
        Ok(())
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Durable page store location and sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: String,
    pub max_size_mb: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_CACHE_DIR.to_string(),
            max_size_mb: DEFAULT_CACHE_MAX_MB,
        }
    }
}

impl StoreConfig {
    /// # Environment Variables
    /// - `KENNEL_CACHE_DIR` (default: ./kennel-cache)
    /// - `KENNEL_CACHE_MAX_MB` (default: 64)
    pub fn from_env() -> Self {
        Self {
            path: std::env::var("KENNEL_CACHE_DIR").unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string()),
            max_size_mb: env_or("KENNEL_CACHE_MAX_MB", DEFAULT_CACHE_MAX_MB),
        }
    }

    pub fn validate(&self) -> KennelResult<()> {
        if self.path.trim().is_empty() {
            return Err(invalid("path", &self.path, "must not be empty").into());
        }
        if self.max_size_mb == 0 {
            return Err(invalid("max_size_mb", self.max_size_mb, "must be at least 1").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KennelError;

    #[test]
    fn test_defaults_validate() {
        UpstreamConfig::default().validate().expect("upstream");
        RetryConfig::default().validate().expect("retry");
        IngestConfig::default().validate().expect("ingest");
        SchedulerConfig::default().validate().expect("scheduler");
        StoreConfig::default().validate().expect("store");
    }

    #[test]
    fn test_default_values() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 5);
        let sched = SchedulerConfig::default();
        assert_eq!(sched.refresh_interval, Duration::from_secs(600));
        let ingest = IngestConfig::default();
        assert_eq!(ingest.warmup_pages, 5);
        assert_eq!(ingest.empty_pages_to_stop, 2);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        match config.validate() {
            Err(KennelError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "max_attempts");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_max_delay_below_base_rejected() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(1),
            ..RetryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KennelError::Config(ConfigError::IncompatibleOptions { .. }))
        ));
    }

    #[test]
    fn test_warmup_beyond_ceiling_rejected() {
        let config = IngestConfig {
            warmup_pages: 10,
            max_pages: 5,
            ..IngestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_upstream_rejected() {
        let config = UpstreamConfig {
            base_url: "ftp://example.com".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_helpers_fall_back_on_garbage() {
        assert_eq!(env_or("KENNEL_TEST_UNSET_VARIABLE_XYZ", 7u32), 7);
        assert!(env_flag("KENNEL_TEST_UNSET_VARIABLE_XYZ", true));
    }
}
