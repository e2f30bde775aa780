//! Tier configuration endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use mission_core::{MessageTemplates, MissionConfig, TierConfig};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Get the active configuration
pub async fn get_config(State(state): State<AppState>) -> ApiResult<Json<MissionConfig>> {
    let config = state
        .engine
        .get_config()
        .await?
        .ok_or_else(|| ApiError::NotFound("Config not found".to_string()))?;

    Ok(Json(config))
}

/// Replace the whole configuration
pub async fn save_config(
    State(state): State<AppState>,
    payload: Result<Json<MissionConfig>, JsonRejection>,
) -> ApiResult<Json<MissionConfig>> {
    let Json(config) = payload?;
    Ok(Json(state.engine.save_config(config).await?))
}

/// Replace the tier list
pub async fn update_tiers(
    State(state): State<AppState>,
    payload: Result<Json<Vec<TierConfig>>, JsonRejection>,
) -> ApiResult<Json<MissionConfig>> {
    let Json(tiers) = payload?;
    Ok(Json(state.engine.update_tiers(tiers).await?))
}

/// Replace the message templates
pub async fn update_messages(
    State(state): State<AppState>,
    payload: Result<Json<MessageTemplates>, JsonRejection>,
) -> ApiResult<Json<MissionConfig>> {
    let Json(messages) = payload?;
    Ok(Json(state.engine.update_messages(messages).await?))
}
