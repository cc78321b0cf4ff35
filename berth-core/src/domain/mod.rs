//! Core domain types
//!
//! This module contains the core domain structures used across Berth crates.
//! These types are persisted by the orchestrator and rendered by the CLI.

pub mod key;
pub mod service;
