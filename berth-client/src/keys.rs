//! Service key API endpoints

use berth_core::domain::key::ServiceKey;
use berth_core::dto::key::{CreateKey, KeyQuery};

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Register a repository and receive its service key
    ///
    /// Fails with a 409 when the repository is already registered and a 404
    /// when the source host does not know it.
    pub async fn create_key(&self, repository: &str) -> Result<ServiceKey> {
        let req = CreateKey {
            repository: repository.to_string(),
        };
        let response = self
            .client
            .post(self.url("/api/keys"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Fetch the key of an already registered repository
    pub async fn get_key(&self, repository: &str) -> Result<ServiceKey> {
        let query = KeyQuery {
            repository: repository.to_string(),
        };
        let response = self
            .client
            .get(self.url("/api/keys"))
            .query(&query)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
