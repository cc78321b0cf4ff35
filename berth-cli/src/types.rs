//! Common types used across CLI modules

/// Length of a full service identity (hex SHA-256)
const FULL_ID_LEN: usize = 64;

/// Identifier that can be either a full service identity or an unambiguous prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    /// Full identity
    Full(String),
    /// Prefix that should uniquely identify a service
    Prefix(String),
}

impl IdOrPrefix {
    /// Parse a string into an IdOrPrefix
    ///
    /// 64 hex characters are a full identity; anything else is a prefix.
    pub fn parse(input: &str) -> Self {
        let normalized = input.trim().to_lowercase();
        if normalized.len() == FULL_ID_LEN && normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            IdOrPrefix::Full(normalized)
        } else {
            IdOrPrefix::Prefix(normalized)
        }
    }

    /// Get the identity if this is a full ID
    pub fn as_full(&self) -> Option<&str> {
        match self {
            IdOrPrefix::Full(id) => Some(id),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            IdOrPrefix::Full(id) | IdOrPrefix::Prefix(id) => id,
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for IdOrPrefix {
    fn from(s: &str) -> Self {
        IdOrPrefix::parse(s)
    }
}
