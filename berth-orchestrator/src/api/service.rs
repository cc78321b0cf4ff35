//! Service API Handlers
//!
//! HTTP endpoints for operating deployed services.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use berth_core::domain::service::{ServiceConfiguration, ServiceIdentity, ServiceStatus};
use berth_core::dto::service::{BuildAccepted, BuildService, ProxyReloaded, RebootReport};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /api/services
/// List every service with its live status
pub async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<ServiceStatus>>> {
    tracing::debug!("Listing all services");

    let services = state.orchestrator.get_all_services().await?;
    Ok(Json(services))
}

/// POST /api/services/build
/// Deploy a repository head, or rebuild it if already known
pub async fn build_service(
    State(state): State<AppState>,
    Json(req): Json<BuildService>,
) -> ApiResult<(StatusCode, Json<BuildAccepted>)> {
    if req.repository.trim().is_empty() {
        return Err(ApiError::BadRequest("repository cannot be empty".to_string()));
    }

    tracing::info!("Build requested for {}@{}", req.repository, req.head());

    let id = state
        .orchestrator
        .build_repository(&req.repository, req.head())
        .await?;

    Ok((StatusCode::ACCEPTED, Json(BuildAccepted { id })))
}

/// POST /api/services/reboot
/// Rebuild every service one after another
pub async fn reboot_services(State(state): State<AppState>) -> ApiResult<Json<RebootReport>> {
    tracing::info!("Rebooting all services");

    let report = state.orchestrator.reboot_all().await?;
    Ok(Json(report))
}

/// GET /api/services/{id}
pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceStatus>> {
    let id = ServiceIdentity::from_hex(id);
    tracing::debug!("Getting service: {}", id);

    let status = state.orchestrator.get_service(&id).await?;
    Ok(Json(status))
}

/// DELETE /api/services/{id}
pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = ServiceIdentity::from_hex(id);
    tracing::info!("Deleting service: {}", id);

    state.orchestrator.delete_service(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/services/{id}/start
/// Run the last built image without rebuilding
pub async fn start_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceStatus>> {
    let id = ServiceIdentity::from_hex(id);
    tracing::info!("Starting service: {}", id);

    let status = state.orchestrator.start_service(&id).await?;
    Ok(Json(status))
}

/// POST /api/services/{id}/stop
pub async fn stop_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = ServiceIdentity::from_hex(id);
    tracing::info!("Stopping service: {}", id);

    state.orchestrator.stop_service(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/services/{id}/rebuild
/// Rebuild a service and wait for it to come back
pub async fn rebuild_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceConfiguration>> {
    let id = ServiceIdentity::from_hex(id);
    tracing::info!("Rebuilding service: {}", id);

    let config = state.orchestrator.rebuild_by_id(&id).await?;
    Ok(Json(config))
}

/// POST /api/proxy/reload
/// Rewrite every proxy config and reload the proxy
pub async fn reload_proxy(State(state): State<AppState>) -> ApiResult<Json<ProxyReloaded>> {
    tracing::info!("Reloading reverse proxy");

    let configured = state.orchestrator.reload_proxy().await?;
    Ok(Json(ProxyReloaded { configured }))
}
