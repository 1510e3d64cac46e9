//! HTTP client for the upstream page endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use kennel_core::{ConfigError, KennelResult, PageNumber, RawRecord, UpstreamConfig, UpstreamError};
use reqwest::{header::HeaderMap, Client};

use crate::UpstreamSource;

/// Fetches `GET {base_url}?page=N` and expects a JSON array body.
pub struct HttpUpstream {
    client: Client,
    base_url: String,
    attempt_timeout: Duration,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig, attempt_timeout: Duration) -> KennelResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "upstream.client".to_string(),
                value: config.user_agent.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            attempt_timeout,
        })
    }

    fn classify(&self, page: PageNumber, error: reqwest::Error, started: Instant) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout {
                page,
                elapsed: started.elapsed(),
            }
        } else if error.is_connect() {
            UpstreamError::Connect {
                page,
                reason: error.to_string(),
            }
        } else if error.is_body() || error.is_decode() {
            UpstreamError::Malformed {
                page,
                reason: error.to_string(),
            }
        } else {
            UpstreamError::Transport {
                page,
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl UpstreamSource for HttpUpstream {
    async fn fetch_once(&self, page: PageNumber) -> Result<Vec<RawRecord>, UpstreamError> {
        let started = Instant::now();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("page", page)])
            .timeout(self.attempt_timeout)
            .send()
            .await
            .map_err(|e| self.classify(page, e, started))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                page,
                status: status.as_u16(),
                retry_after: parse_retry_after(response.headers()),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify(page, e, started))?;
        parse_page(page, &body)
    }
}

impl std::fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("base_url", &self.base_url)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

/// Decode a page body. Anything but a JSON array is malformed.
pub fn parse_page(page: PageNumber, body: &[u8]) -> Result<Vec<RawRecord>, UpstreamError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| UpstreamError::Malformed {
            page,
            reason: format!("invalid JSON: {}", e),
        })?;

    match value {
        serde_json::Value::Array(records) => Ok(records),
        other => Err(UpstreamError::Malformed {
            page,
            reason: format!("expected a JSON array, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// `Retry-After` in (possibly fractional) seconds. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
}
