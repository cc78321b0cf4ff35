//! Service DTOs
//!
//! Data transfer objects for service-related operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::service::{ServiceIdentity, WebSocket};

/// Head used when a build request does not name one
pub const DEFAULT_HEAD: &str = "master";

/// Configuration a repository declares about itself
///
/// Every field is optional: the manifest is folded over caller-supplied
/// overrides and the orchestrator fills in the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceManifest {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,

    /// Explicit public domain, routed in addition to the derived subdomain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_socket: Option<WebSocket>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

impl ServiceManifest {
    /// Folds this manifest over `overrides`
    ///
    /// Fields present in `self` win; absent ones are taken from `overrides`.
    pub fn merged_over(self, overrides: ServiceManifest) -> ServiceManifest {
        ServiceManifest {
            service_type: self.service_type.or(overrides.service_type),
            domain: self.domain.or(overrides.domain),
            web_socket: self.web_socket.or(overrides.web_socket),
            env: self.env.or(overrides.env),
        }
    }
}

/// Request to build (deploy or rebuild) a repository head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildService {
    pub repository: String,

    #[serde(default)]
    pub head: Option<String>,
}

impl BuildService {
    pub fn head(&self) -> &str {
        self.head.as_deref().unwrap_or(DEFAULT_HEAD)
    }
}

/// Build request authorized by a service key instead of a webhook signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerBuild {
    pub repository: String,

    #[serde(default)]
    pub head: Option<String>,

    pub key: String,
}

/// Acknowledgement of an accepted build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAccepted {
    pub id: ServiceIdentity,
}

/// A service that failed to rebuild during a reboot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildFailure {
    pub id: ServiceIdentity,
    pub error: String,
}

/// Outcome of rebuilding every known service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebootReport {
    pub rebuilt: Vec<ServiceIdentity>,
    pub failed: Vec<RebuildFailure>,
}

/// Outcome of rewriting every proxy config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyReloaded {
    /// Services whose route was written
    pub configured: usize,
}
