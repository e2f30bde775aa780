//! Data Transfer Objects for API requests and responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============ Mission DTOs ============

/// Create mission request
#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    /// LINE user ID
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub phone_number: String,
}

/// Update mission status request
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// 0-based position in the mission's tier list
    #[serde(alias = "tierIndex")]
    pub tier_index: usize,
}

/// Query selecting a user
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

/// Active mission check response
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckMissionResponse {
    #[serde(rename = "hasMission")]
    pub has_mission: bool,
}

// ============ Reward DTOs ============

/// Claim reward response
#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimRewardResponse {
    pub message: String,
    pub status: String,
    pub log_id: String,
}

/// Reward decision sent by the reward system
#[derive(Debug, Deserialize)]
pub struct RewardCallbackRequest {
    pub log_id: String,
    /// approve or reject
    pub status: String,
}

/// Reward callback response
#[derive(Debug, Serialize, Deserialize)]
pub struct RewardCallbackResponse {
    pub log_id: String,
    pub callback_time: DateTime<Utc>,
    pub status: String,
    pub message: String,
}

// ============ Activity DTOs ============

/// Activity query, dates in RFC 3339
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Activity response
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub bet: f64,
}

/// Message log query
#[derive(Debug, Deserialize)]
pub struct MessageLogQuery {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

// ============ Health DTOs ============

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pending_events: u64,
    pub failed_events: u64,
    pub active_missions: u64,
}
