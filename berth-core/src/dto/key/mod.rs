//! Service key DTOs

use serde::{Deserialize, Serialize};

/// Request to register a repository and issue its service key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateKey {
    pub repository: String,
}

/// Query for the key of an already registered repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyQuery {
    pub repository: String,
}
