//! Service domain model
//!
//! A service is one (repository, head) deployment: a built image, a running
//! container named after the service identity, and the proxy routes in front of it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Number of identity characters used for the derived subdomain
pub const SHORT_ID_LEN: usize = 7;

/// Content-derived identifier of a (repository, head) pair
///
/// Lowercase hex SHA-256 of the repository URL followed by the head reference.
/// Used as the container name, the storage key, and the source of the
/// fallback subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceIdentity(String);

impl ServiceIdentity {
    /// Derives the identity for a repository at a given head
    pub fn derive(repository: &str, head: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(repository.as_bytes());
        hasher.update(head.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already computed identity (e.g. read back from an API path)
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the identity, used for the derived subdomain
    pub fn short(&self) -> &str {
        &self.0[..SHORT_ID_LEN.min(self.0.len())]
    }

    /// Subdomain under which the service is always reachable
    pub fn subdomain(&self, base_domain: &str) -> String {
        format!("{}.{}", self.short(), base_domain)
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServiceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Secondary bidirectional streaming channel declared by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSocket {
    /// Request path routed to the second port (e.g. "/ws")
    pub path: String,
}

/// Durable record for one deployed service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfiguration {
    pub id: ServiceIdentity,

    /// Runtime image family used to build the service
    #[serde(rename = "type")]
    pub service_type: String,

    /// Human-facing repository page
    pub url: String,

    pub clone_url: String,

    pub branch: String,

    pub repository: String,

    #[serde(default)]
    pub web_socket: Option<WebSocket>,

    /// Hostnames routed to this service, explicit domain first
    #[serde(default)]
    pub domains: Vec<String>,

    /// Allocated host ports: HTTP first, then the WebSocket port if any
    #[serde(default)]
    pub ports: Vec<u16>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Image produced by the last successful build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

impl ServiceConfiguration {
    /// Primary HTTP port, if allocated
    pub fn http_port(&self) -> Option<u16> {
        self.ports.first().copied()
    }

    /// WebSocket port, present only when a WebSocket channel was declared
    pub fn web_socket_port(&self) -> Option<u16> {
        self.web_socket.as_ref().and(self.ports.get(1).copied())
    }

    /// Name of the container running this service
    pub fn container_name(&self) -> &str {
        self.id.as_str()
    }
}

/// A service record merged with live container-engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(flatten)]
    pub config: ServiceConfiguration,

    /// Whether a container for this service is currently running
    pub online: bool,
}
