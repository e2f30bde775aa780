//! API Error types

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mission_core::MissionError;
use serde::Serialize;
use thiserror::Error;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Mission error: {0}")]
    Mission(#[from] MissionError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn mission_status(e: &MissionError) -> (StatusCode, &'static str) {
    match e {
        MissionError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        MissionError::ClaimNotPending(_) => (StatusCode::NOT_FOUND, "CLAIM_NOT_PENDING"),
        MissionError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        MissionError::NotEligible(_) => (StatusCode::BAD_REQUEST, "NOT_ELIGIBLE"),
        MissionError::Conflict { .. } => (StatusCode::CONFLICT, "VERSION_CONFLICT"),
        MissionError::StateTransition(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
        MissionError::RewardGateway(_) => (StatusCode::BAD_GATEWAY, "REWARD_GATEWAY_ERROR"),
        MissionError::Oracle(_) => (StatusCode::BAD_GATEWAY, "ORACLE_ERROR"),
        MissionError::Notification(_) | MissionError::Network(_) => {
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
        }
        MissionError::Timeout(..) => (StatusCode::BAD_GATEWAY, "UPSTREAM_TIMEOUT"),
        MissionError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR"),
        MissionError::Storage(_) | MissionError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
            ApiError::Mission(e) => {
                let (status, code) = mission_status(e);
                (status, code, e.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!("{} {}: {}", status, code, message);
        }

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;
