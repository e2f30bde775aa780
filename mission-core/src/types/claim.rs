//! Reward claim log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{ClaimLogId, MissionId};
use crate::error::MissionError;

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Approve,
    Reject,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approve => "approve",
            ClaimStatus::Reject => "reject",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision carried by the reward callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    Approve,
    Reject,
}

impl ClaimDecision {
    /// Parse the callback status; anything other than approve or reject is invalid
    pub fn parse(s: &str) -> Result<Self, MissionError> {
        match s {
            "approve" => Ok(ClaimDecision::Approve),
            "reject" => Ok(ClaimDecision::Reject),
            other => Err(MissionError::InvalidInput(format!(
                "Invalid status '{}': must be 'approve' or 'reject'",
                other
            ))),
        }
    }

    pub fn status(&self) -> ClaimStatus {
        match self {
            ClaimDecision::Approve => ClaimStatus::Approve,
            ClaimDecision::Reject => ClaimStatus::Reject,
        }
    }
}

/// Record of one reward claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardClaimLog {
    pub id: ClaimLogId,
    pub user_id: String,
    pub mission_id: MissionId,
    pub tier: u32,
    pub level: u32,
    pub mission_detail: String,
    pub reward: u64,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub callback_time: Option<DateTime<Utc>>,
}
