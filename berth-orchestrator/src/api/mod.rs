//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod keys;
pub mod service;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::Orchestrator;

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,

    /// Webhooks are refused while unset
    pub webhook_secret: Option<String>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Build triggers
        .route("/webhook", post(webhook::handle_webhook))
        .route("/trigger", post(webhook::handle_trigger))
        // Service endpoints
        .route("/api/services", get(service::list_services))
        .route("/api/services/build", post(service::build_service))
        .route("/api/services/reboot", post(service::reboot_services))
        .route(
            "/api/services/{id}",
            get(service::get_service).delete(service::delete_service),
        )
        .route("/api/services/{id}/start", post(service::start_service))
        .route("/api/services/{id}/stop", post(service::stop_service))
        .route("/api/services/{id}/rebuild", post(service::rebuild_service))
        .route("/api/proxy/reload", post(service::reload_proxy))
        // Key endpoints
        .route("/api/keys", post(keys::create_key).get(keys::get_key))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const SECRET: &str = "s3cret";

    fn app(h: &Harness) -> Router {
        create_router(AppState {
            orchestrator: h.orchestrator.clone(),
            webhook_secret: Some(SECRET.to_string()),
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn push_event(repository: &str, git_ref: &str) -> Vec<u8> {
        serde_json::json!({
            "ref": git_ref,
            "repository": { "full_name": repository },
        })
        .to_string()
        .into_bytes()
    }

    fn webhook(body: Vec<u8>, signature: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("X-Hub-Signature", signature)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = Harness::new();
        let response = app(&h).oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_build_then_list_and_get() {
        let h = Harness::new();
        let app = app(&h);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/services/build",
                serde_json::json!({ "repository": "acme/site" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();
        h.orchestrator.wait_for_background_builds().await;

        let response = app.clone().oneshot(get_request("/api/services")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let services = body_json(response).await;
        assert_eq!(services.as_array().unwrap().len(), 1);
        assert_eq!(services[0]["id"], id.as_str());
        assert_eq!(services[0]["branch"], "master");
        assert_eq!(services[0]["online"], true);

        let response = app
            .oneshot(get_request(&format!("/api/services/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["type"], "node");
    }

    #[tokio::test]
    async fn test_unknown_service_is_404() {
        let h = Harness::new();
        let response = app(&h)
            .oneshot(get_request("/api/services/deadbeef"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_stop_then_delete() {
        let h = Harness::new();
        let id = h
            .orchestrator
            .build_repository("acme/site", "master")
            .await
            .unwrap();
        h.orchestrator.wait_for_background_builds().await;
        let app = app(&h);

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/services/{}/stop", id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(h.engine.running().is_empty());

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/services/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(h.orchestrator.get_all_services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_registration_conflict() {
        let h = Harness::new();
        let app = app(&h);
        let body = serde_json::json!({ "repository": "acme/site" });

        let response = app
            .clone()
            .oneshot(post_json("/api/keys", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let key = body_json(response).await["key"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(post_json("/api/keys", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(get_request("/api/keys?repository=acme/site"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["key"], key.as_str());
    }

    #[tokio::test]
    async fn test_trigger_requires_matching_key() {
        let h = Harness::new();
        let key = h.orchestrator.create_key("acme/site").await.unwrap();
        let app = app(&h);

        let response = app
            .clone()
            .oneshot(post_json(
                "/trigger",
                serde_json::json!({ "repository": "acme/site", "key": "wrong" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(h.orchestrator.get_all_services().await.unwrap().is_empty());

        let response = app
            .oneshot(post_json(
                "/trigger",
                serde_json::json!({ "repository": "acme/site", "head": "dev", "key": key.key }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let services = h.orchestrator.get_all_services().await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].config.branch, "dev");
    }

    #[tokio::test]
    async fn test_signed_webhook_builds_branch() {
        let h = Harness::new();
        let body = push_event("acme/site", "refs/heads/dev");
        let signature = webhook::sign(SECRET.as_bytes(), &body);

        let response = app(&h).oneshot(webhook(body, &signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let expected = Orchestrator::identity("acme/site", "dev");
        assert_eq!(body_json(response).await["id"], expected.as_str());
        h.orchestrator.wait_for_background_builds().await;
        assert!(h.orchestrator.get_service(&expected).await.unwrap().online);
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected_without_side_effects() {
        let h = Harness::new();
        let body = push_event("acme/site", "refs/heads/master");
        let signature = webhook::sign(b"not-the-secret", &body);

        let response = app(&h).oneshot(webhook(body, &signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        h.orchestrator.wait_for_background_builds().await;
        assert!(h.orchestrator.get_all_services().await.unwrap().is_empty());
        assert!(h.engine.calls().is_empty());
        assert_eq!(h.proxy.reload_count(), 0);
    }

    #[tokio::test]
    async fn test_webhooks_refused_without_secret() {
        let h = Harness::new();
        let app = create_router(AppState {
            orchestrator: h.orchestrator.clone(),
            webhook_secret: None,
        });
        let body = push_event("acme/site", "refs/heads/master");
        let signature = webhook::sign(SECRET.as_bytes(), &body);

        let response = app.oneshot(webhook(body, &signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(h.orchestrator.get_all_services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tag_push_is_ignored() {
        let h = Harness::new();
        let body = push_event("acme/site", "refs/tags/v1.0.0");
        let signature = webhook::sign(SECRET.as_bytes(), &body);

        let response = app(&h).oneshot(webhook(body, &signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(h.orchestrator.get_all_services().await.unwrap().is_empty());
    }
}
