//! Process configuration aggregate.

use std::net::SocketAddr;

use kennel_core::{
    ConfigError, IngestConfig, KennelResult, RetryConfig, SchedulerConfig, StoreConfig,
    UpstreamConfig,
};

use crate::constants::{DEFAULT_BIND, DEFAULT_PORT};

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// # Environment Variables
    /// - `KENNEL_BIND`: listen address (default: 0.0.0.0)
    /// - `PORT`, then `KENNEL_PORT`: listen port (default: 5000)
    pub fn from_env() -> KennelResult<Self> {
        let bind = std::env::var("KENNEL_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let port = match std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("KENNEL_PORT").ok())
        {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                field: "port".to_string(),
                value: raw.clone(),
                reason: "must be a port number".to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        Ok(Self { bind, port })
    }

    pub fn socket_addr(&self) -> KennelResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue {
                field: "bind".to_string(),
                value: addr.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Every configuration section the service needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KennelConfig {
    pub upstream: UpstreamConfig,
    pub retry: RetryConfig,
    pub ingest: IngestConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
}

impl KennelConfig {
    pub fn from_env() -> KennelResult<Self> {
        Ok(Self {
            upstream: UpstreamConfig::from_env(),
            retry: RetryConfig::from_env(),
            ingest: IngestConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            store: StoreConfig::from_env(),
            server: ServerConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> KennelResult<()> {
        self.upstream.validate()?;
        self.retry.validate()?;
        self.ingest.validate()?;
        self.scheduler.validate()?;
        self.store.validate()?;
        self.server.socket_addr()?;
        Ok(())
    }
}
