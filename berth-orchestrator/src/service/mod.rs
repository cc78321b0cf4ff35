//! Service Module
//!
//! Business logic layer for the orchestrator.
//! The `Orchestrator` owns the stores and the adapters and drives every
//! service lifecycle operation; front ends (HTTP API, startup recovery) only
//! call into it.

pub mod error;
pub mod keys;
pub mod orchestrator;
pub mod ports;

pub use error::{RegistrationFailure, Result, ServiceError};
pub use orchestrator::{DeployRequest, Orchestrator, RecoveryReport};

/// Settings consumed by the orchestrator
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Domain under which every service gets a derived subdomain
    pub base_domain: String,

    /// Type used when the declared one is missing or unsupported
    pub default_type: String,

    pub supported_types: Vec<String>,

    /// Open interval ports are drawn from
    pub port_range: (u16, u16),

    /// Candidates drawn per port before allocation gives up
    pub port_attempts: u32,
}
