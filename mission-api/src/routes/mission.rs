//! Mission endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use mission_core::{ClaimLogId, ExpirationEvent, Mission, MissionId};

use crate::dto::{
    CheckMissionResponse, ClaimRewardResponse, CreateMissionRequest, RewardCallbackRequest,
    RewardCallbackResponse, UpdateStatusRequest, UserQuery,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn required_user(query: UserQuery) -> ApiResult<String> {
    query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("User ID is required".to_string()))
}

/// Create a mission for a user
pub async fn create_mission(
    State(state): State<AppState>,
    payload: Result<Json<CreateMissionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Mission>)> {
    let Json(req) = payload?;
    let mission = state
        .engine
        .create_mission(&req.user_id, &req.phone_number)
        .await?;

    Ok((StatusCode::CREATED, Json(mission)))
}

/// Get mission by ID
pub async fn get_mission(
    State(state): State<AppState>,
    Path(mission_id): Path<String>,
) -> ApiResult<Json<Mission>> {
    let mission = state.engine.get_mission(&MissionId::from(mission_id)).await?;
    Ok(Json(mission))
}

/// Resolve the open level of a tier now
pub async fn update_status(
    State(state): State<AppState>,
    Path(mission_id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Json<Mission>> {
    let Json(req) = payload?;
    let mission = state
        .engine
        .update_status(&MissionId::from(mission_id), req.tier_index)
        .await?;

    Ok(Json(mission))
}

/// Claim the reward of the current tier
pub async fn claim_reward(
    State(state): State<AppState>,
    Path(mission_id): Path<String>,
) -> ApiResult<Json<ClaimRewardResponse>> {
    let receipt = state
        .engine
        .claim_reward(&MissionId::from(mission_id))
        .await?;

    Ok(Json(ClaimRewardResponse {
        message: "Reward claim submitted".to_string(),
        status: receipt.log.status.to_string(),
        log_id: receipt.log.id.to_string(),
    }))
}

/// Whether the user has a processing or pending mission
pub async fn check_mission(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<CheckMissionResponse>> {
    let user_id = required_user(query)?;
    let has_mission = state.engine.has_active_mission(&user_id).await?;

    Ok(Json(CheckMissionResponse { has_mission }))
}

/// Latest mission of the user
pub async fn processing_mission(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Mission>> {
    let user_id = required_user(query)?;
    let mission = state.engine.latest_mission(&user_id).await?;

    Ok(Json(mission))
}

/// Scheduled events of a mission
pub async fn mission_events(
    State(state): State<AppState>,
    Path(mission_id): Path<String>,
) -> ApiResult<Json<Vec<ExpirationEvent>>> {
    let id = MissionId::from(mission_id);
    // 404 for unknown missions rather than an empty list
    state.engine.get_mission(&id).await?;
    let events = state.engine.mission_events(&id).await?;

    Ok(Json(events))
}

/// Reward decision from the reward system
pub async fn reward_callback(
    State(state): State<AppState>,
    payload: Result<Json<RewardCallbackRequest>, JsonRejection>,
) -> ApiResult<Json<RewardCallbackResponse>> {
    let Json(req) = payload?;
    let outcome = state
        .engine
        .reward_callback(&ClaimLogId::from(req.log_id), &req.status)
        .await?;

    Ok(Json(RewardCallbackResponse {
        log_id: outcome.log_id.to_string(),
        callback_time: outcome.callback_time,
        status: outcome.status.to_string(),
        message: outcome.message,
    }))
}
