//! Expiration events
//!
//! Disposable scheduling artifacts. The mission record stays authoritative;
//! handlers re-read it before acting on an event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{EventId, MissionId};

/// Event status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    /// Claimed by a processor
    Processed,
    /// Voided before it fired
    Cancelled,
    /// Quarantined after repeated handler failures
    Failed,
}

/// What an event triggers when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LevelExpiration,
    FollowUp,
    RewardExpiration,
    RewardNotification,
    RecurringRewardNotification,
}

impl EventType {
    /// Event types tied to an unclaimed reward
    pub const REWARD: [EventType; 3] = [
        EventType::RewardExpiration,
        EventType::RewardNotification,
        EventType::RecurringRewardNotification,
    ];

    /// Event types tied to an open level window
    pub const LEVEL: [EventType; 2] = [EventType::LevelExpiration, EventType::FollowUp];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LevelExpiration => "level_expiration",
            EventType::FollowUp => "follow_up",
            EventType::RewardExpiration => "reward_expiration",
            EventType::RewardNotification => "reward_notification",
            EventType::RecurringRewardNotification => "recurring_reward_notification",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-triggered action bound to one mission, tier and level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpirationEvent {
    pub id: EventId,
    pub mission_id: MissionId,
    pub tier: u32,
    pub level: u32,
    pub expire_time: DateTime<Utc>,
    pub status: EventStatus,
    pub event_type: EventType,
    /// Times the event has been claimed
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExpirationEvent {
    pub fn new(
        mission_id: MissionId,
        tier: u32,
        level: u32,
        event_type: EventType,
        expire_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            mission_id,
            tier,
            level,
            expire_time,
            status: EventStatus::Pending,
            event_type,
            attempts: 0,
            last_error: None,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Pending && self.expire_time <= now
    }
}

/// Selects pending events of one mission for cancellation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Empty matches every type
    pub types: Vec<EventType>,
    pub tier: Option<u32>,
    pub level: Option<u32>,
}

impl EventFilter {
    /// Pending reward events of any tier
    pub fn reward() -> Self {
        Self {
            types: EventType::REWARD.to_vec(),
            ..Default::default()
        }
    }

    /// Pending level events of one level
    pub fn level(tier: u32, level: u32) -> Self {
        Self {
            types: EventType::LEVEL.to_vec(),
            tier: Some(tier),
            level: Some(level),
        }
    }

    pub fn matches(&self, event: &ExpirationEvent) -> bool {
        (self.types.is_empty() || self.types.contains(&event.event_type))
            && self.tier.map_or(true, |t| t == event.tier)
            && self.level.map_or(true, |l| l == event.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(event_type: EventType, tier: u32, level: u32) -> ExpirationEvent {
        let now = Utc::now();
        ExpirationEvent::new(MissionId::from("m1"), tier, level, event_type, now, now)
    }

    #[test]
    fn test_due_is_inclusive() {
        let now = Utc::now();
        let mut e = ExpirationEvent::new(
            MissionId::from("m1"),
            1,
            1,
            EventType::FollowUp,
            now,
            now - Duration::hours(1),
        );
        assert!(e.is_due(now));
        assert!(!e.is_due(now - Duration::seconds(1)));

        e.status = EventStatus::Processed;
        assert!(!e.is_due(now));
    }

    #[test]
    fn test_filters() {
        let reward = EventFilter::reward();
        assert!(reward.matches(&event(EventType::RewardExpiration, 1, 2)));
        assert!(reward.matches(&event(EventType::RecurringRewardNotification, 3, 1)));
        assert!(!reward.matches(&event(EventType::LevelExpiration, 1, 2)));

        let level = EventFilter::level(1, 2);
        assert!(level.matches(&event(EventType::FollowUp, 1, 2)));
        assert!(!level.matches(&event(EventType::FollowUp, 1, 1)));
        assert!(!level.matches(&event(EventType::RewardExpiration, 1, 2)));
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventType::RecurringRewardNotification).unwrap(),
            "\"recurring_reward_notification\""
        );
        assert_eq!(EventType::LevelExpiration.to_string(), "level_expiration");
    }
}
