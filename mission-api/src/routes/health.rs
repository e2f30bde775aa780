//! Health check endpoints

use axum::{extract::State, Json};

use crate::dto::HealthResponse;
use crate::error::ApiResult;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let stats = state.engine.stats().await.unwrap_or_default();

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        pending_events: stats.pending_events,
        failed_events: stats.failed_events,
        active_missions: stats.active_missions,
    }))
}

/// Ready check endpoint (verifies storage and tier configuration)
pub async fn ready_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let stats = state.engine.stats().await;
    let configured = matches!(state.engine.get_config().await, Ok(Some(_)));

    let status = if stats.is_ok() && configured {
        "ready"
    } else {
        "degraded"
    };
    let stats = stats.unwrap_or_default();

    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        pending_events: stats.pending_events,
        failed_events: stats.failed_events,
        active_missions: stats.active_missions,
    }))
}
