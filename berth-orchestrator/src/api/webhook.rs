//! Build Trigger API Handlers
//!
//! Push webhooks from the source host (HMAC-SHA1 signed) and key-authorized
//! build triggers. Both end in `build_repository`.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use berth_core::dto::service::{BuildAccepted, TriggerBuild};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::ServiceError;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// The part of a push event the orchestrator reads
#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: PushRepository,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    full_name: String,
}

/// POST /webhook
/// Build the pushed branch of a repository
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        tracing::warn!("Rejected webhook: no webhook secret configured");
        return Err(ApiError::Unauthorized("webhooks are disabled".to_string()));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing signature".to_string()))?;

    if !verify_signature(secret.as_bytes(), &body, signature) {
        tracing::warn!("Rejected webhook: signature mismatch");
        return Err(ApiError::Unauthorized("invalid signature".to_string()));
    }

    let event: PushEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid push event: {}", e)))?;

    let Some(branch) = event.git_ref.strip_prefix(BRANCH_REF_PREFIX) else {
        tracing::debug!("Ignoring push to non-branch ref {}", event.git_ref);
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "ignored": event.git_ref })),
        ));
    };

    tracing::info!(
        "Push webhook for {}@{}",
        event.repository.full_name,
        branch
    );

    let id = state
        .orchestrator
        .build_repository(&event.repository.full_name, branch)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "id": id }))))
}

/// POST /trigger
/// Build a repository head on presentation of its service key
pub async fn handle_trigger(
    State(state): State<AppState>,
    Json(req): Json<TriggerBuild>,
) -> ApiResult<(StatusCode, Json<BuildAccepted>)> {
    let head = req.head.as_deref().unwrap_or(berth_core::dto::service::DEFAULT_HEAD);

    state
        .orchestrator
        .verify_key(&req.repository, &req.key)
        .await
        .map_err(|e| match e {
            ServiceError::KeyNotFound(_) | ServiceError::Unauthorized(_) => {
                ApiError::Unauthorized(e.to_string())
            }
            e => ApiError::from(e),
        })?;

    tracing::info!("Key-authorized build for {}@{}", req.repository, head);

    let id = state.orchestrator.build_repository(&req.repository, head).await?;
    Ok((StatusCode::ACCEPTED, Json(BuildAccepted { id })))
}

/// Checks a `sha1=<hex>` signature against the HMAC-SHA1 of `body`
fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix("sha1=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret) else {
        return false;
    };

    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `sha1=<hex>` signature of `body`, as the source host sends it
#[cfg(test)]
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(secret).unwrap();
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_signature() {
        let body = br#"{"ref":"refs/heads/master"}"#;
        let header = sign(b"s3cret", body);

        assert!(verify_signature(b"s3cret", body, &header));
        assert!(!verify_signature(b"other", body, &header));
        assert!(!verify_signature(b"s3cret", b"tampered", &header));
        assert!(!verify_signature(b"s3cret", body, header.trim_start_matches("sha1=")));
        assert!(!verify_signature(b"s3cret", body, "sha1=zz"));
    }

    #[test]
    fn test_known_signature() {
        // HMAC-SHA1("key", "The quick brown fox jumps over the lazy dog")
        assert_eq!(
            sign(b"key", b"The quick brown fox jumps over the lazy dog"),
            "sha1=de7c9b85b8b78aa6bc8a7a36f70a90701c9db4d9"
        );
    }
}
