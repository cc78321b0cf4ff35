//! Reverse proxy adapter
//!
//! Writes one routing config per service and reloads the proxy so it picks
//! them up. `NginxProxy` renders nginx server blocks.

pub mod nginx;

pub use nginx::NginxProxy;

use async_trait::async_trait;
use berth_core::domain::service::{ServiceConfiguration, ServiceIdentity};
use std::path::PathBuf;
use thiserror::Error;

/// Reverse proxy error type
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to write proxy config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Service {0} has no allocated port to route to")]
    NoPort(ServiceIdentity),

    #[error("Failed to execute proxy reload '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Proxy reload failed: exit_code={exit_code}, stderr='{stderr}'")]
    ReloadFailed { exit_code: i32, stderr: String },
}

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Operations the orchestrator performs against the reverse proxy
#[async_trait]
pub trait ReverseProxy: Send + Sync {
    /// Writes (or overwrites) the routing config of a service
    async fn configure(&self, service: &ServiceConfiguration) -> Result<()>;

    /// Removes the routing config of a service; missing configs are fine
    async fn remove(&self, id: &ServiceIdentity) -> Result<()>;

    /// Makes the proxy load the current set of configs
    async fn reload(&self) -> Result<()>;
}
