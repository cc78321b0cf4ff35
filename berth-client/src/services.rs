//! Service-related API endpoints

use berth_core::domain::service::{ServiceConfiguration, ServiceStatus};
use berth_core::dto::service::{BuildAccepted, BuildService, ProxyReloaded, RebootReport};

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    // =============================================================================
    // Service Management
    // =============================================================================

    /// Deploy a repository head, or rebuild it if it is already deployed
    ///
    /// Returns once the build is accepted; the build itself runs in the background.
    ///
    /// # Arguments
    /// * `repository` - Repository reference (e.g. "acme/site")
    /// * `head` - Branch to build, "master" when `None`
    pub async fn build(&self, repository: &str, head: Option<&str>) -> Result<BuildAccepted> {
        let req = BuildService {
            repository: repository.to_string(),
            head: head.map(str::to_string),
        };
        let response = self
            .client
            .post(self.url("/api/services/build"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List all services with their live status
    pub async fn list_services(&self) -> Result<Vec<ServiceStatus>> {
        let response = self.client.get(self.url("/api/services")).send().await?;

        self.handle_response(response).await
    }

    /// Get a service by its full identity
    pub async fn get_service(&self, id: &str) -> Result<ServiceStatus> {
        let url = self.url(&format!("/api/services/{}", id));
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }

    /// Run the last built image of a service
    pub async fn start_service(&self, id: &str) -> Result<ServiceStatus> {
        let url = self.url(&format!("/api/services/{}/start", id));
        let response = self.client.post(url).send().await?;

        self.handle_response(response).await
    }

    pub async fn stop_service(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/api/services/{}/stop", id));
        let response = self.client.post(url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Rebuild a service and wait for the new container
    pub async fn rebuild_service(&self, id: &str) -> Result<ServiceConfiguration> {
        let url = self.url(&format!("/api/services/{}/rebuild", id));
        let response = self.client.post(url).send().await?;

        self.handle_response(response).await
    }

    /// Stop a service, remove its route and forget it
    pub async fn delete_service(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/api/services/{}", id));
        let response = self.client.delete(url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Rebuild every service
    pub async fn reboot(&self) -> Result<RebootReport> {
        let response = self
            .client
            .post(self.url("/api/services/reboot"))
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Reverse Proxy
    // =============================================================================

    /// Rewrite every proxy config and reload the proxy
    pub async fn reload_proxy(&self) -> Result<ProxyReloaded> {
        let response = self
            .client
            .post(self.url("/api/proxy/reload"))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
