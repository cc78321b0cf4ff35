//! Source host adapter
//!
//! Everything the orchestrator asks of the source-hosting service: whether a
//! repository exists, where its clone URL and manifest live, and what the
//! manifest says. All calls may be slow or fail; none are retried here.

pub mod github;

pub use github::GitHubSource;

use async_trait::async_trait;
use berth_core::dto::service::ServiceManifest;
use thiserror::Error;

/// Source host error type
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid service manifest at {url}: {source}")]
    InvalidManifest {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unrecognized repository reference '{0}'")]
    InvalidRepository(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Where a repository head can be cloned from and where its manifest lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub repository: String,
    pub branch: String,
    pub clone_url: String,
    pub url: String,
    pub configuration_url: String,
}

/// Operations the orchestrator performs against the source host
#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn exists(&self, repository: &str) -> Result<bool>;

    /// Fetches and parses the manifest at `url`; a missing manifest is empty
    async fn fetch_service_configuration(&self, url: &str) -> Result<ServiceManifest>;

    async fn get_service_from_repository(
        &self,
        repository: &str,
        head: &str,
    ) -> Result<RepositoryDescriptor>;
}
