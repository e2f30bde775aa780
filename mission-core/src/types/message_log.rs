//! Sent message log
//!
//! One entry per user message the engine tried to deliver, kept whether or
//! not the dispatcher succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{MessageLogId, MissionId};
use super::notice::{MessageKind, Notice, UserMessage};

/// Delivery outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Record of one delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: MessageLogId,
    pub user_id: String,
    pub mission_id: MissionId,
    pub tier: u32,
    pub level: u32,
    pub kind: MessageKind,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_description: Option<String>,
    pub status: DeliveryStatus,
    /// Dispatcher error when delivery failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl MessageLog {
    /// Entry for a rendered notice; `error` is the dispatcher failure, if any
    pub fn record(
        notice: &Notice,
        message: &UserMessage,
        error: Option<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageLogId::generate(),
            user_id: notice.user_id.clone(),
            mission_id: notice.mission_id.clone(),
            tier: notice.tier,
            level: notice.level,
            kind: notice.kind,
            title: message.title.clone(),
            description: message.description.clone(),
            sub_description: message.sub_description.clone(),
            status: if error.is_some() {
                DeliveryStatus::Failed
            } else {
                DeliveryStatus::Sent
            },
            error,
            sent_at,
        }
    }
}
