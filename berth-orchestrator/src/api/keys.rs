//! Service Key API Handlers

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use berth_core::domain::key::ServiceKey;
use berth_core::dto::key::{CreateKey, KeyQuery};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /api/keys
/// Register a repository and issue its service key
pub async fn create_key(
    State(state): State<AppState>,
    Json(req): Json<CreateKey>,
) -> ApiResult<(StatusCode, Json<ServiceKey>)> {
    if req.repository.trim().is_empty() {
        return Err(ApiError::BadRequest("repository cannot be empty".to_string()));
    }

    tracing::info!("Registering repository: {}", req.repository);

    let key = state.orchestrator.create_key(&req.repository).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

/// GET /api/keys?repository=
pub async fn get_key(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> ApiResult<Json<ServiceKey>> {
    tracing::debug!("Getting key for {}", query.repository);

    let key = state.orchestrator.get_key(&query.repository).await?;
    Ok(Json(key))
}
