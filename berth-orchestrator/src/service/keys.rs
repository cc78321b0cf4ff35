//! Service keys
//!
//! A repository is registered by issuing it a key; the key later authorizes
//! build triggers that do not come with a webhook signature.

use berth_core::domain::key::ServiceKey;
use rand::RngCore;
use tracing::{info, warn};

use super::{Orchestrator, RegistrationFailure, Result, ServiceError};

/// Bytes of random material hashed into every key
const KEY_ENTROPY_LEN: usize = 256;

impl Orchestrator {
    /// Registers a repository and issues its key
    ///
    /// Fails without side effects when the repository is already registered
    /// or the source host does not know it.
    pub async fn create_key(&self, repository: &str) -> Result<ServiceKey> {
        let storage_key = ServiceKey::storage_key(repository);
        let _registration = self.registration.lock().await;

        if self.keys.has(&storage_key).await? {
            return Err(ServiceError::Registration {
                repository: repository.to_string(),
                reason: RegistrationFailure::AlreadyRegistered,
            });
        }

        let exists = self
            .source
            .exists(repository)
            .await
            .map_err(|source| ServiceError::Source {
                repository: repository.to_string(),
                source,
            })?;
        if !exists {
            return Err(ServiceError::Registration {
                repository: repository.to_string(),
                reason: RegistrationFailure::RepositoryNotFound,
            });
        }

        let mut entropy = [0u8; KEY_ENTROPY_LEN];
        rand::rng().fill_bytes(&mut entropy);
        let key = ServiceKey::from_entropy(repository, &entropy);

        self.keys.set(&storage_key, &key).await?;

        info!("Registered {} and issued a service key", repository);
        Ok(key)
    }

    pub async fn get_key(&self, repository: &str) -> Result<ServiceKey> {
        self.keys
            .get(&ServiceKey::storage_key(repository))
            .await?
            .ok_or_else(|| ServiceError::KeyNotFound(repository.to_string()))
    }

    /// Checks a presented key against the one issued for `repository`
    pub async fn verify_key(&self, repository: &str, presented: &str) -> Result<()> {
        let issued = self.get_key(repository).await?;

        if !constant_time_eq(issued.key.as_bytes(), presented.trim().as_bytes()) {
            warn!("Rejected build trigger for {}: key mismatch", repository);
            return Err(ServiceError::Unauthorized(repository.to_string()));
        }

        Ok(())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
