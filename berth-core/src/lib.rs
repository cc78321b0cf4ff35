//! Berth Core
//!
//! Core types and abstractions for the Berth deployment orchestrator.
//!
//! This crate contains:
//! - Domain types: Core business entities (ServiceConfiguration, ServiceKey, etc.)
//! - DTOs: Data transfer objects for communication between the CLI and the orchestrator

pub mod domain;
pub mod dto;
