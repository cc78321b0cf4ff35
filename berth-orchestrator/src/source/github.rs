//! GitHub-compatible source host
//!
//! Works against any host exposing the GitHub REST (`/repos/{owner}/{name}`)
//! and raw content (`/{owner}/{name}/{head}/{file}`) layouts. Clone and
//! browse URLs are built from the configured web base, so GitHub Enterprise
//! needs all three bases pointed at it.

use async_trait::async_trait;
use berth_core::dto::service::ServiceManifest;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::{RepositoryDescriptor, Result, SourceError, SourceHost};

const USER_AGENT: &str = concat!("berth/", env!("CARGO_PKG_VERSION"));

pub struct GitHubSource {
    client: Client,
    api_url: String,
    raw_url: String,
    web_url: String,
    token: Option<String>,
    manifest_file: String,
}

impl GitHubSource {
    /// # Arguments
    /// * `api_url` - REST API base (e.g. "https://api.github.com")
    /// * `raw_url` - Raw content base (e.g. "https://raw.githubusercontent.com")
    /// * `web_url` - Web base that clone and browse URLs hang off (e.g. "https://github.com")
    /// * `token` - Optional API token for private repositories and rate limits
    /// * `manifest_file` - Manifest file name in the repository root
    pub fn new(
        api_url: &str,
        raw_url: &str,
        web_url: &str,
        token: Option<String>,
        manifest_file: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            raw_url: raw_url.trim_end_matches('/').to_string(),
            web_url: web_url.trim_end_matches('/').to_string(),
            token,
            manifest_file,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl SourceHost for GitHubSource {
    async fn exists(&self, repository: &str) -> Result<bool> {
        let slug = repository_slug(repository, &self.web_url)?;
        let url = format!("{}/repos/{}", self.api_url, slug);

        let response = self.get(&url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(SourceError::Status {
                url,
                status: status.as_u16(),
            }),
        }
    }

    async fn fetch_service_configuration(&self, url: &str) -> Result<ServiceManifest> {
        let response = self.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("No manifest at {}, using an empty one", url);
            return Ok(ServiceManifest::default());
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| SourceError::InvalidManifest {
            url: url.to_string(),
            source,
        })
    }

    async fn get_service_from_repository(
        &self,
        repository: &str,
        head: &str,
    ) -> Result<RepositoryDescriptor> {
        let slug = repository_slug(repository, &self.web_url)?;

        Ok(RepositoryDescriptor {
            repository: repository.to_string(),
            branch: head.to_string(),
            clone_url: format!("{}/{}.git", self.web_url, slug),
            url: format!("{}/{}", self.web_url, slug),
            configuration_url: format!(
                "{}/{}/{}/{}",
                self.raw_url, slug, head, self.manifest_file
            ),
        })
    }
}

/// Reduces a repository reference to `owner/name`
///
/// Accepts `owner/name`, `<web_url>/owner/name(.git)` and
/// `git@<web host>:owner/name.git`.
fn repository_slug(repository: &str, web_url: &str) -> Result<String> {
    let host = web_url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let prefixes = [
        format!("https://{}/", host),
        format!("http://{}/", host),
        format!("git@{}:", host),
    ];

    let trimmed = repository.trim().trim_end_matches('/');
    let without_host = prefixes
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix.as_str()))
        .unwrap_or(trimmed);
    let slug = without_host.trim_end_matches(".git");

    let mut parts = slug.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None)
            if !owner.is_empty() && !name.is_empty() && !owner.contains(':') =>
        {
            Ok(format!("{}/{}", owner, name))
        }
        _ => Err(SourceError::InvalidRepository(repository.to_string())),
    }
}
