//! Tracing subscriber initialization.
//!
//! JSON lines by default so the run history can be reconstructed from logs;
//! `KENNEL_LOG_FORMAT=pretty` switches to the human formatter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants::DEFAULT_LOG_FILTER;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_filter: DEFAULT_LOG_FILTER.to_string(),
            service_name: "kennel-api".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// # Environment Variables
    /// - `KENNEL_LOG_FORMAT`: `json` (default) or `pretty`
    /// - `RUST_LOG`: standard `EnvFilter` directives
    pub fn from_env() -> Self {
        let format = match std::env::var("KENNEL_LOG_FORMAT") {
            Ok(value) if value.trim().eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };
        Self {
            format,
            ..Self::default()
        }
    }
}

/// Install the global tracing subscriber. Call once at start-up.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
    };
    result.map_err(|e| ApiError::Telemetry(e.to_string()))?;

    tracing::info!(
        service_name = %config.service_name,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}
