//! Wager activity and sent message lookups

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};

use mission_core::MessageLog;

use crate::dto::{ActivityQuery, ActivityResponse, MessageLogQuery};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_MESSAGE_LIMIT: usize = 50;
const MAX_MESSAGE_LIMIT: usize = 500;

fn parse_date(name: &str, value: Option<String>) -> ApiResult<DateTime<Utc>> {
    let value = value.ok_or_else(|| ApiError::BadRequest(format!("{} is required", name)))?;
    DateTime::parse_from_rfc3339(&value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ApiError::BadRequest(format!("Invalid {}: {}", name, e)))
}

/// Wager total of a user over a window
pub async fn get_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<ActivityResponse>> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("User ID is required".to_string()))?;
    let start = parse_date("start_date", query.start_date)?;
    let end = parse_date("end_date", query.end_date)?;

    let bet = state.engine.activity(&user_id, start, end).await?;
    Ok(Json(ActivityResponse { bet }))
}

/// Messages sent to a user, newest first
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageLogQuery>,
) -> ApiResult<Json<Vec<MessageLog>>> {
    let user_id = query
        .user_id
        .ok_or_else(|| ApiError::BadRequest("User ID is required".to_string()))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .min(MAX_MESSAGE_LIMIT);

    let logs = state.engine.message_logs(&user_id, limit).await?;
    Ok(Json(logs))
}
