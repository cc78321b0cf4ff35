//! Service key domain model
//!
//! A service key is an opaque per-repository credential that authorizes
//! build triggers for that repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Credential authorizing a repository to request builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceKey {
    pub repository: String,

    /// Hex encoded secret handed to the repository owner
    pub key: String,

    pub created_at: DateTime<Utc>,
}

impl ServiceKey {
    /// Storage key under which the credential of `repository` is kept
    pub fn storage_key(repository: &str) -> String {
        hex::encode(Sha256::digest(repository.as_bytes()))
    }

    /// Derives a key value from raw random material
    pub fn from_entropy(repository: &str, entropy: &[u8]) -> Self {
        Self {
            repository: repository.to_string(),
            key: hex::encode(Sha256::digest(entropy)),
            created_at: Utc::now(),
        }
    }
}
