//! In-memory storage
//!
//! Used by tests and development runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{MissionStorage, StorageStats};
use crate::error::{MissionError, MissionResult};
use crate::types::{
    ClaimLogId, ClaimStatus, EventFilter, EventId, EventStatus, ExpirationEvent, MessageLog,
    Mission, MissionConfig, MissionId, RewardClaimLog,
};

/// In-memory storage
///
/// Each collection sits behind its own `RwLock`. Conditional writes hold the
/// write lock across the check and the update.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    missions: Arc<RwLock<HashMap<MissionId, Mission>>>,
    events: Arc<RwLock<HashMap<EventId, ExpirationEvent>>>,
    claims: Arc<RwLock<HashMap<ClaimLogId, RewardClaimLog>>>,
    messages: Arc<RwLock<Vec<MessageLog>>>,
    config: Arc<RwLock<Option<MissionConfig>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything
    pub async fn clear(&self) {
        self.missions.write().await.clear();
        self.events.write().await.clear();
        self.claims.write().await.clear();
        self.messages.write().await.clear();
        *self.config.write().await = None;
    }
}

#[async_trait]
impl MissionStorage for MemoryStorage {
    // ==================== Missions ====================

    async fn insert_mission(&self, mission: &Mission) -> MissionResult<()> {
        let mut missions = self.missions.write().await;
        if missions.contains_key(&mission.id) {
            return Err(MissionError::Storage(format!(
                "Mission {} already exists",
                mission.id
            )));
        }
        missions.insert(mission.id.clone(), mission.clone());
        Ok(())
    }

    async fn get_mission(&self, id: &MissionId) -> MissionResult<Option<Mission>> {
        Ok(self.missions.read().await.get(id).cloned())
    }

    async fn update_mission(&self, mission: &Mission) -> MissionResult<Mission> {
        let mut missions = self.missions.write().await;
        let stored = missions
            .get_mut(&mission.id)
            .ok_or_else(|| MissionError::NotFound(format!("Mission {} not found", mission.id)))?;

        if stored.version != mission.version {
            return Err(MissionError::Conflict {
                mission_id: mission.id.to_string(),
                expected: mission.version,
                found: stored.version,
            });
        }

        let mut updated = mission.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn latest_mission_for_user(&self, user_id: &str) -> MissionResult<Option<Mission>> {
        let missions = self.missions.read().await;
        Ok(missions
            .values()
            .filter(|m| m.user_id == user_id)
            .max_by_key(|m| m.created_at)
            .cloned())
    }

    async fn has_active_mission(&self, user_id: &str) -> MissionResult<bool> {
        let missions = self.missions.read().await;
        Ok(missions
            .values()
            .any(|m| m.user_id == user_id && m.is_active()))
    }

    // ==================== Events ====================

    async fn insert_event(&self, event: &ExpirationEvent) -> MissionResult<()> {
        self.events
            .write()
            .await
            .insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn claim_due_event(&self, now: DateTime<Utc>) -> MissionResult<Option<ExpirationEvent>> {
        let mut events = self.events.write().await;

        let next = events
            .values()
            .filter(|e| e.is_due(now))
            .min_by_key(|e| (e.expire_time, e.created_at))
            .map(|e| e.id.clone());

        Ok(next.and_then(|id| {
            events.get_mut(&id).map(|event| {
                event.status = EventStatus::Processed;
                event.attempts += 1;
                event.clone()
            })
        }))
    }

    async fn release_event(
        &self,
        id: &EventId,
        retry_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> MissionResult<()> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(id)
            .ok_or_else(|| MissionError::NotFound(format!("Event {} not found", id)))?;

        event.last_error = Some(error.to_string());
        match retry_at {
            Some(at) => {
                event.status = EventStatus::Pending;
                event.expire_time = at;
            }
            None => event.status = EventStatus::Failed,
        }
        Ok(())
    }

    async fn cancel_events(&self, mission_id: &MissionId, filter: &EventFilter) -> MissionResult<u64> {
        let mut events = self.events.write().await;
        let mut cancelled = 0;
        for event in events.values_mut() {
            if &event.mission_id == mission_id
                && event.status == EventStatus::Pending
                && filter.matches(event)
            {
                event.status = EventStatus::Cancelled;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn list_events(&self, mission_id: &MissionId) -> MissionResult<Vec<ExpirationEvent>> {
        let events = self.events.read().await;
        let mut list: Vec<ExpirationEvent> = events
            .values()
            .filter(|e| &e.mission_id == mission_id)
            .cloned()
            .collect();
        list.sort_by_key(|e| (e.expire_time, e.created_at));
        Ok(list)
    }

    // ==================== Reward claims ====================

    async fn insert_claim_log(&self, log: &RewardClaimLog) -> MissionResult<()> {
        self.claims.write().await.insert(log.id.clone(), log.clone());
        Ok(())
    }

    async fn get_claim_log(&self, id: &ClaimLogId) -> MissionResult<Option<RewardClaimLog>> {
        Ok(self.claims.read().await.get(id).cloned())
    }

    async fn resolve_claim_log(
        &self,
        id: &ClaimLogId,
        status: ClaimStatus,
        at: DateTime<Utc>,
    ) -> MissionResult<Option<RewardClaimLog>> {
        let mut claims = self.claims.write().await;
        let log = claims
            .get_mut(id)
            .ok_or_else(|| MissionError::NotFound(format!("Reward claim {} not found", id)))?;

        if log.status != ClaimStatus::Pending {
            return Ok(None);
        }
        log.status = status;
        log.callback_time = Some(at);
        Ok(Some(log.clone()))
    }

    async fn reopen_claim_log(&self, id: &ClaimLogId, status: ClaimStatus) -> MissionResult<bool> {
        let mut claims = self.claims.write().await;
        match claims.get_mut(id) {
            Some(log) if log.status == status && status != ClaimStatus::Pending => {
                log.status = ClaimStatus::Pending;
                log.callback_time = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ==================== Message logs ====================

    async fn insert_message_log(&self, log: &MessageLog) -> MissionResult<()> {
        self.messages.write().await.push(log.clone());
        Ok(())
    }

    async fn list_message_logs(&self, user_id: &str, limit: usize) -> MissionResult<Vec<MessageLog>> {
        let messages = self.messages.read().await;
        let mut list: Vec<MessageLog> = messages
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        list.truncate(limit);
        Ok(list)
    }

    // ==================== Configuration ====================

    async fn load_config(&self) -> MissionResult<Option<MissionConfig>> {
        Ok(self.config.read().await.clone())
    }

    async fn save_config(&self, config: &MissionConfig) -> MissionResult<()> {
        *self.config.write().await = Some(config.clone());
        Ok(())
    }

    // ==================== Stats ====================

    async fn get_stats(&self) -> MissionResult<StorageStats> {
        let missions = self.missions.read().await;
        let events = self.events.read().await;
        let claims = self.claims.read().await;

        Ok(StorageStats {
            total_missions: missions.len() as u64,
            active_missions: missions.values().filter(|m| m.is_active()).count() as u64,
            pending_events: events
                .values()
                .filter(|e| e.status == EventStatus::Pending)
                .count() as u64,
            failed_events: events
                .values()
                .filter(|e| e.status == EventStatus::Failed)
                .count() as u64,
            pending_claims: claims
                .values()
                .filter(|c| c.status == ClaimStatus::Pending)
                .count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, MessageKind, MessageTemplates, MissionStatus, Notice};
    use chrono::Duration;

    fn create_test_mission(user_id: &str, now: DateTime<Utc>) -> Mission {
        let config = MissionConfig::sample();
        Mission::new(user_id, "0800000000", config.first_tier().unwrap(), now)
    }

    fn create_test_event(mission: &Mission, event_type: EventType, at: DateTime<Utc>) -> ExpirationEvent {
        ExpirationEvent::new(mission.id.clone(), 1, 1, event_type, at, at - Duration::hours(1))
    }

    fn create_test_claim(mission: &Mission, now: DateTime<Utc>) -> RewardClaimLog {
        RewardClaimLog {
            id: ClaimLogId::generate(),
            user_id: mission.user_id.clone(),
            mission_id: mission.id.clone(),
            tier: 1,
            level: 2,
            mission_detail: "Tier 1".to_string(),
            reward: 100,
            status: ClaimStatus::Pending,
            created_at: now,
            callback_time: None,
        }
    }

    #[tokio::test]
    async fn test_update_mission_checks_version() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        let mission = create_test_mission("U1", now);
        storage.insert_mission(&mission).await.unwrap();

        let mut first = mission.clone();
        first.status = MissionStatus::Pending;
        let stored = storage.update_mission(&first).await.unwrap();
        assert_eq!(stored.version, 1);

        // A writer holding the old snapshot loses
        let mut stale = mission.clone();
        stale.status = MissionStatus::Failed;
        let err = storage.update_mission(&stale).await.unwrap_err();
        assert!(matches!(err, MissionError::Conflict { expected: 0, found: 1, .. }));

        let current = storage.get_mission(&mission.id).await.unwrap().unwrap();
        assert_eq!(current.status, MissionStatus::Pending);
    }

    #[tokio::test]
    async fn test_latest_and_active_mission() {
        let storage = MemoryStorage::new();
        let now = Utc::now();

        let mut old = create_test_mission("U1", now - Duration::days(2));
        old.status = MissionStatus::Failed;
        let new = create_test_mission("U1", now);
        storage.insert_mission(&old).await.unwrap();
        assert!(!storage.has_active_mission("U1").await.unwrap());

        storage.insert_mission(&new).await.unwrap();
        let latest = storage.latest_mission_for_user("U1").await.unwrap().unwrap();
        assert_eq!(latest.id, new.id);
        assert!(storage.has_active_mission("U1").await.unwrap());
        assert!(storage.latest_mission_for_user("U2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_due_event_in_time_order() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        let mission = create_test_mission("U1", now);

        let later = create_test_event(&mission, EventType::FollowUp, now - Duration::minutes(1));
        let earlier = create_test_event(&mission, EventType::LevelExpiration, now - Duration::minutes(5));
        let future = create_test_event(&mission, EventType::LevelExpiration, now + Duration::minutes(5));
        for e in [&later, &earlier, &future] {
            storage.insert_event(e).await.unwrap();
        }

        let first = storage.claim_due_event(now).await.unwrap().unwrap();
        assert_eq!(first.id, earlier.id);
        assert_eq!(first.status, EventStatus::Processed);
        assert_eq!(first.attempts, 1);

        let second = storage.claim_due_event(now).await.unwrap().unwrap();
        assert_eq!(second.id, later.id);

        assert!(storage.claim_due_event(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let storage = Arc::new(MemoryStorage::new());
        let now = Utc::now();
        let mission = create_test_mission("U1", now);
        let event = create_test_event(&mission, EventType::LevelExpiration, now);
        storage.insert_event(&event).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move { storage.claim_due_event(now).await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_release_requeues_or_quarantines() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        let mission = create_test_mission("U1", now);
        let event = create_test_event(&mission, EventType::LevelExpiration, now);
        storage.insert_event(&event).await.unwrap();

        let claimed = storage.claim_due_event(now).await.unwrap().unwrap();
        let retry_at = now + Duration::minutes(1);
        storage.release_event(&claimed.id, Some(retry_at), "oracle down").await.unwrap();
        assert!(storage.claim_due_event(now).await.unwrap().is_none());

        let again = storage.claim_due_event(retry_at).await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
        assert_eq!(again.last_error.as_deref(), Some("oracle down"));

        storage.release_event(&again.id, None, "still down").await.unwrap();
        let stats = storage.get_stats().await.unwrap();
        assert_eq!(stats.failed_events, 1);
        assert_eq!(stats.pending_events, 0);
    }

    #[tokio::test]
    async fn test_cancel_events_by_filter() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        let mission = create_test_mission("U1", now);

        for event_type in [
            EventType::RewardExpiration,
            EventType::RewardNotification,
            EventType::LevelExpiration,
        ] {
            let event = create_test_event(&mission, event_type, now + Duration::hours(1));
            storage.insert_event(&event).await.unwrap();
        }

        let cancelled = storage.cancel_events(&mission.id, &EventFilter::reward()).await.unwrap();
        assert_eq!(cancelled, 2);

        let events = storage.list_events(&mission.id).await.unwrap();
        let pending: Vec<_> = events.iter().filter(|e| e.status == EventStatus::Pending).collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, EventType::LevelExpiration);
    }

    #[tokio::test]
    async fn test_resolve_claim_log_once() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        let mission = create_test_mission("U1", now);
        let log = create_test_claim(&mission, now);
        storage.insert_claim_log(&log).await.unwrap();

        let resolved = storage
            .resolve_claim_log(&log.id, ClaimStatus::Approve, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, ClaimStatus::Approve);
        assert_eq!(resolved.callback_time, Some(now));

        let second = storage
            .resolve_claim_log(&log.id, ClaimStatus::Reject, now)
            .await
            .unwrap();
        assert!(second.is_none());

        let missing = storage
            .resolve_claim_log(&ClaimLogId::from("nope"), ClaimStatus::Approve, now)
            .await;
        assert!(matches!(missing, Err(MissionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reopen_claim_log_only_reverts_matching_decision() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        let mission = create_test_mission("U1", now);
        let log = create_test_claim(&mission, now);
        storage.insert_claim_log(&log).await.unwrap();

        assert!(!storage.reopen_claim_log(&log.id, ClaimStatus::Approve).await.unwrap());

        storage
            .resolve_claim_log(&log.id, ClaimStatus::Approve, now)
            .await
            .unwrap();
        assert!(!storage.reopen_claim_log(&log.id, ClaimStatus::Reject).await.unwrap());
        assert!(storage.reopen_claim_log(&log.id, ClaimStatus::Approve).await.unwrap());

        let stored = storage.get_claim_log(&log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ClaimStatus::Pending);
        assert!(stored.callback_time.is_none());
        assert!(storage
            .resolve_claim_log(&log.id, ClaimStatus::Reject, now)
            .await
            .unwrap()
            .is_some());
        assert!(!storage
            .reopen_claim_log(&ClaimLogId::from("nope"), ClaimStatus::Reject)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_message_logs_newest_first_per_user() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        let mission = create_test_mission("U1", now);

        for (user, kind, minutes) in [
            ("U1", MessageKind::Followup, 0),
            ("U1", MessageKind::MissionSuccess, 10),
            ("U2", MessageKind::Followup, 5),
            ("U1", MessageKind::MissionFailed, 20),
        ] {
            let notice = Notice::new(user, mission.id.clone(), 1, 1, kind);
            let message = notice.render(&MessageTemplates::default());
            let log = MessageLog::record(&notice, &message, None, now + Duration::minutes(minutes));
            storage.insert_message_log(&log).await.unwrap();
        }

        let logs = storage.list_message_logs("U1", 10).await.unwrap();
        let kinds: Vec<_> = logs.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::MissionFailed,
                MessageKind::MissionSuccess,
                MessageKind::Followup
            ]
        );
        assert_eq!(storage.list_message_logs("U1", 1).await.unwrap().len(), 1);
        assert!(storage.list_message_logs("U3", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_config_roundtrip_and_clear() {
        let storage = MemoryStorage::new();
        assert!(storage.load_config().await.unwrap().is_none());

        storage.save_config(&MissionConfig::sample()).await.unwrap();
        assert_eq!(storage.load_config().await.unwrap().unwrap().tiers.len(), 3);

        storage.clear().await;
        assert!(storage.load_config().await.unwrap().is_none());
    }
}
