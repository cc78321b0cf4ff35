//! Data Transfer Objects
//!
//! Request and response bodies exchanged between the CLI, webhooks and the
//! orchestrator, plus the manifest a repository declares about itself.

pub mod key;
pub mod service;
