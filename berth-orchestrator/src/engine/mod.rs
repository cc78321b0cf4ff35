//! Container engine adapter
//!
//! The orchestrator only needs four operations from the container engine:
//! list running containers, build an image, run a service, stop a service.
//! `PodmanEngine` drives the podman (or docker) CLI; tests substitute fakes.

pub mod podman;

pub use podman::PodmanEngine;

use async_trait::async_trait;
use berth_core::domain::service::{ServiceConfiguration, ServiceIdentity};
use thiserror::Error;

/// Container engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Build failed for {repository} ({id}): exit_code={exit_code}, stderr='{stderr}'")]
    BuildFailed {
        repository: String,
        id: ServiceIdentity,
        exit_code: i32,
        stderr: String,
    },

    #[error("Run failed for {id}: exit_code={exit_code}, stderr='{stderr}'")]
    RunFailed {
        id: ServiceIdentity,
        exit_code: i32,
        stderr: String,
    },

    #[error("Stop failed for {id}: exit_code={exit_code}, stderr='{stderr}'")]
    StopFailed {
        id: ServiceIdentity,
        exit_code: i32,
        stderr: String,
    },

    #[error("Listing containers failed: exit_code={exit_code}, stderr='{stderr}'")]
    ListFailed { exit_code: i32, stderr: String },

    #[error("Service {0} has no built image")]
    NotBuilt(ServiceIdentity),

    #[error("Failed to prepare data directory for {id}: {source}")]
    DataDir {
        id: ServiceIdentity,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Operations the orchestrator performs against the container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Names of all currently running containers
    async fn list_running_containers(&self) -> Result<Vec<String>>;

    /// Builds the image for a service and returns its image ID
    async fn build_image(&self, service: &ServiceConfiguration) -> Result<String>;

    /// Starts a detached container for a service from its built image
    async fn run_service(&self, service: &ServiceConfiguration) -> Result<()>;

    /// Stops the container of a service; a no-op when it is not running
    async fn stop_service(&self, service: &ServiceConfiguration) -> Result<()>;
}
