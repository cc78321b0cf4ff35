//! Service error type

use berth_core::domain::service::ServiceIdentity;
use thiserror::Error;

use crate::engine::EngineError;
use crate::proxy::ProxyError;
use crate::repository::StoreError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The source host could not describe the repository or serve its manifest
    #[error("Deployment of {repository}@{head} failed: {source}")]
    DeploymentFailed {
        repository: String,
        head: String,
        #[source]
        source: SourceError,
    },

    #[error("Unknown service {0}")]
    UnknownService(String),

    #[error("Service {0} has not been built yet")]
    NotBuilt(ServiceIdentity),

    #[error("A build is already in progress for {0}")]
    BuildInProgress(ServiceIdentity),

    #[error("No free port in ({min}, {max}) after {attempts} attempts")]
    PortAllocationExhausted { min: u16, max: u16, attempts: u32 },

    #[error("Cannot register {repository}: {reason}")]
    Registration {
        repository: String,
        reason: RegistrationFailure,
    },

    #[error("Source host lookup for {repository} failed: {source}")]
    Source {
        repository: String,
        #[source]
        source: SourceError,
    },

    #[error("No service key registered for {0}")]
    KeyNotFound(String),

    #[error("Invalid service key for {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Proxy update failed: {0}")]
    Proxy(#[from] ProxyError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a repository could not be registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistrationFailure {
    #[error("repository is already registered")]
    AlreadyRegistered,

    #[error("repository does not exist")]
    RepositoryNotFound,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
