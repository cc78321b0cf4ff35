//! ID resolver module
//!
//! Resolves service identity prefixes (such as the 7 characters of a derived
//! subdomain) to full identities by querying the service listing.

use anyhow::{Context, Result, anyhow};
use berth_client::OrchestratorClient;

use crate::types::IdOrPrefix;

/// Resolve a service ID or prefix to a full identity
///
/// If the input is already a full identity, returns it immediately.
/// Otherwise, fetches all services and finds the one matching the prefix.
///
/// # Errors
/// Returns an error if:
/// - No service matches the prefix
/// - Multiple services match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_service_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<String> {
    if let Some(id) = id_or_prefix.as_full() {
        return Ok(id.to_string());
    }

    let services = client
        .list_services()
        .await
        .context("Failed to fetch services for ID resolution")?;

    match_prefix(
        services.iter().map(|s| s.config.id.as_str()),
        id_or_prefix.as_str(),
    )
}

/// Picks the single identity starting with `prefix`
fn match_prefix<'a>(ids: impl Iterator<Item = &'a str>, prefix: &str) -> Result<String> {
    if prefix.is_empty() {
        return Err(anyhow!("Service ID cannot be empty"));
    }

    let matches: Vec<&str> = ids.filter(|id| id.starts_with(prefix)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No service found with ID starting with '{}'", prefix)),
        [id] => Ok(id.to_string()),
        _ => Err(anyhow!(
            "Ambiguous prefix '{}' matches multiple services: {}",
            prefix,
            matches.join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: [&str; 3] = ["ba7816bf", "ba7816c0", "0c1f2e3d"];

    #[test]
    fn test_unique_prefix_resolves() {
        assert_eq!(match_prefix(IDS.into_iter(), "0c").unwrap(), "0c1f2e3d");
        assert_eq!(match_prefix(IDS.into_iter(), "ba7816b").unwrap(), "ba7816bf");
    }

    #[test]
    fn test_ambiguous_prefix_is_an_error() {
        let err = match_prefix(IDS.into_iter(), "ba78").unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));
    }

    #[test]
    fn test_unknown_or_empty_prefix_is_an_error() {
        assert!(match_prefix(IDS.into_iter(), "ff").is_err());
        assert!(match_prefix(IDS.into_iter(), "").is_err());
    }
}
