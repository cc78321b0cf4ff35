//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::{RegistrationFailure, ServiceError};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unauthorized(String),
    BadGateway(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::UnknownService(_) | ServiceError::KeyNotFound(_) => {
                ApiError::NotFound(message)
            }
            ServiceError::Registration {
                reason: RegistrationFailure::RepositoryNotFound,
                ..
            } => ApiError::NotFound(message),
            ServiceError::Registration {
                reason: RegistrationFailure::AlreadyRegistered,
                ..
            }
            | ServiceError::BuildInProgress(_)
            | ServiceError::NotBuilt(_) => ApiError::Conflict(message),
            ServiceError::Unauthorized(_) => ApiError::Unauthorized(message),
            ServiceError::DeploymentFailed { .. } | ServiceError::Source { .. } => {
                ApiError::BadGateway(message)
            }
            ServiceError::PortAllocationExhausted { .. }
            | ServiceError::Engine(_)
            | ServiceError::Proxy(_)
            | ServiceError::Store(_) => ApiError::InternalError(message),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
