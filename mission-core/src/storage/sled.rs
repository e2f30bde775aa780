//! Sled persistent storage
//!
//! Conditional writes use `compare_and_swap` on the serialized record, so
//! several processes or tasks sharing one database never double-claim.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::{MissionStorage, StorageConfig, StorageStats};
use crate::error::{MissionError, MissionResult};
use crate::types::{
    ClaimLogId, ClaimStatus, EventFilter, EventId, EventStatus, ExpirationEvent, MessageLog,
    Mission, MissionConfig, MissionId, RewardClaimLog,
};

/// Tree names
const MISSIONS_TREE: &str = "missions";
const USER_INDEX_TREE: &str = "user_index";
const EVENTS_TREE: &str = "events";
const DUE_INDEX_TREE: &str = "event_due_index";
const MISSION_EVENTS_TREE: &str = "mission_events";
const CLAIMS_TREE: &str = "claim_logs";
const MESSAGES_TREE: &str = "message_logs";
const CONFIG_TREE: &str = "config";

const ACTIVE_CONFIG_KEY: &[u8] = b"active";

/// Sled persistent storage
#[derive(Debug, Clone)]
pub struct SledStorage {
    db: sled::Db,
    missions: sled::Tree,
    /// user_id \0 created_at(BE millis) mission_id -> mission_id
    user_index: sled::Tree,
    events: sled::Tree,
    /// expire_time(BE millis) event_id -> event_id, pending events only
    due_index: sled::Tree,
    /// mission_id \0 event_id -> ()
    mission_events: sled::Tree,
    claims: sled::Tree,
    /// user_id \0 sent_at(BE millis) log_id -> message log
    messages: sled::Tree,
    config: sled::Tree,
}

impl SledStorage {
    /// Open the database configured by `config`
    pub fn new(config: &StorageConfig) -> MissionResult<Self> {
        let db = sled::Config::new()
            .path(&config.data_dir)
            .cache_capacity(config.cache_size)
            .open()
            .map_err(|e| MissionError::Storage(format!("Failed to open sled db: {}", e)))?;
        Self::from_db(db)
    }

    /// Open or create a database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> MissionResult<Self> {
        let db = sled::open(path)
            .map_err(|e| MissionError::Storage(format!("Failed to open sled db: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> MissionResult<Self> {
        let tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| MissionError::Storage(format!("Failed to open {} tree: {}", name, e)))
        };

        Ok(Self {
            missions: tree(MISSIONS_TREE)?,
            user_index: tree(USER_INDEX_TREE)?,
            events: tree(EVENTS_TREE)?,
            due_index: tree(DUE_INDEX_TREE)?,
            mission_events: tree(MISSION_EVENTS_TREE)?,
            claims: tree(CLAIMS_TREE)?,
            messages: tree(MESSAGES_TREE)?,
            config: tree(CONFIG_TREE)?,
            db,
        })
    }

    /// Flush to disk
    pub fn flush(&self) -> MissionResult<()> {
        self.db
            .flush()
            .map_err(|e| MissionError::Storage(format!("Failed to flush db: {}", e)))?;
        Ok(())
    }

    // ==================== Helpers ====================

    fn serialize<T: Serialize>(value: &T) -> MissionResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| MissionError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> MissionResult<T> {
        serde_json::from_slice(bytes).map_err(|e| MissionError::Serialization(e.to_string()))
    }

    fn millis_key(at: DateTime<Utc>) -> [u8; 8] {
        (at.timestamp_millis().max(0) as u64).to_be_bytes()
    }

    fn due_key(event: &ExpirationEvent) -> Vec<u8> {
        let mut key = Self::millis_key(event.expire_time).to_vec();
        key.extend_from_slice(event.id.as_str().as_bytes());
        key
    }

    fn user_prefix(user_id: &str) -> Vec<u8> {
        let mut key = user_id.as_bytes().to_vec();
        key.push(0);
        key
    }

    fn user_key(mission: &Mission) -> Vec<u8> {
        let mut key = Self::user_prefix(&mission.user_id);
        key.extend_from_slice(&Self::millis_key(mission.created_at));
        key.extend_from_slice(mission.id.as_str().as_bytes());
        key
    }

    fn message_key(log: &MessageLog) -> Vec<u8> {
        let mut key = Self::user_prefix(&log.user_id);
        key.extend_from_slice(&Self::millis_key(log.sent_at));
        key.extend_from_slice(log.id.as_str().as_bytes());
        key
    }

    /// Remove a due index entry. A leftover entry is skipped by later claims.
    fn drop_due_entry(&self, key: &[u8]) {
        if let Err(e) = self.due_index.remove(key) {
            warn!("Failed to remove due index entry: {}", e);
        }
    }

    fn mission_event_key(mission_id: &MissionId, event_id: &EventId) -> Vec<u8> {
        let mut key = mission_id.as_str().as_bytes().to_vec();
        key.push(0);
        key.extend_from_slice(event_id.as_str().as_bytes());
        key
    }

    fn get_event(&self, id: &[u8]) -> MissionResult<Option<(sled::IVec, ExpirationEvent)>> {
        match self
            .events
            .get(id)
            .map_err(|e| MissionError::Storage(format!("Failed to get event: {}", e)))?
        {
            Some(bytes) => {
                let event = Self::deserialize(&bytes)?;
                Ok(Some((bytes, event)))
            }
            None => Ok(None),
        }
    }

    /// Swap an event record if nobody changed it since `old` was read
    fn swap_event(&self, old: &sled::IVec, new: &ExpirationEvent) -> MissionResult<bool> {
        let swapped = self
            .events
            .compare_and_swap(new.id.as_str(), Some(old), Some(Self::serialize(new)?))
            .map_err(|e| MissionError::Storage(format!("Failed to swap event: {}", e)))?;
        Ok(swapped.is_ok())
    }

    fn load_missions<'a>(
        &'a self,
        user_id: &str,
    ) -> impl DoubleEndedIterator<Item = MissionResult<Mission>> + 'a {
        self.user_index.scan_prefix(Self::user_prefix(user_id)).map(move |item| {
            let (_, id) = item
                .map_err(|e| MissionError::Storage(format!("Failed to iterate user index: {}", e)))?;
            let bytes = self
                .missions
                .get(&id)
                .map_err(|e| MissionError::Storage(format!("Failed to get mission: {}", e)))?
                .ok_or_else(|| MissionError::Storage("User index points at a missing mission".to_string()))?;
            Self::deserialize(&bytes)
        })
    }
}

#[async_trait]
impl MissionStorage for SledStorage {
    // ==================== Missions ====================

    async fn insert_mission(&self, mission: &Mission) -> MissionResult<()> {
        let value = Self::serialize(mission)?;
        let inserted = self
            .missions
            .compare_and_swap(mission.id.as_str(), None as Option<&[u8]>, Some(value))
            .map_err(|e| MissionError::Storage(format!("Failed to save mission: {}", e)))?;
        if inserted.is_err() {
            return Err(MissionError::Storage(format!(
                "Mission {} already exists",
                mission.id
            )));
        }

        self.user_index
            .insert(Self::user_key(mission), mission.id.as_str())
            .map_err(|e| MissionError::Storage(format!("Failed to index mission: {}", e)))?;
        Ok(())
    }

    async fn get_mission(&self, id: &MissionId) -> MissionResult<Option<Mission>> {
        match self
            .missions
            .get(id.as_str())
            .map_err(|e| MissionError::Storage(format!("Failed to get mission: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn update_mission(&self, mission: &Mission) -> MissionResult<Mission> {
        let old_bytes = self
            .missions
            .get(mission.id.as_str())
            .map_err(|e| MissionError::Storage(format!("Failed to get mission: {}", e)))?
            .ok_or_else(|| MissionError::NotFound(format!("Mission {} not found", mission.id)))?;
        let stored: Mission = Self::deserialize(&old_bytes)?;

        let conflict = |found: u64| MissionError::Conflict {
            mission_id: mission.id.to_string(),
            expected: mission.version,
            found,
        };

        if stored.version != mission.version {
            return Err(conflict(stored.version));
        }

        let mut updated = mission.clone();
        updated.version += 1;

        let swapped = self
            .missions
            .compare_and_swap(
                mission.id.as_str(),
                Some(&old_bytes),
                Some(Self::serialize(&updated)?),
            )
            .map_err(|e| MissionError::Storage(format!("Failed to update mission: {}", e)))?;

        match swapped {
            Ok(()) => Ok(updated),
            Err(_) => Err(conflict(stored.version + 1)),
        }
    }

    async fn latest_mission_for_user(&self, user_id: &str) -> MissionResult<Option<Mission>> {
        self.load_missions(user_id).next_back().transpose()
    }

    async fn has_active_mission(&self, user_id: &str) -> MissionResult<bool> {
        for mission in self.load_missions(user_id) {
            if mission?.is_active() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ==================== Events ====================

    async fn insert_event(&self, event: &ExpirationEvent) -> MissionResult<()> {
        self.events
            .insert(event.id.as_str(), Self::serialize(event)?)
            .map_err(|e| MissionError::Storage(format!("Failed to save event: {}", e)))?;
        self.mission_events
            .insert(Self::mission_event_key(&event.mission_id, &event.id), Vec::<u8>::new())
            .map_err(|e| MissionError::Storage(format!("Failed to index event: {}", e)))?;
        if event.status == EventStatus::Pending {
            self.due_index
                .insert(Self::due_key(event), event.id.as_str())
                .map_err(|e| MissionError::Storage(format!("Failed to index event: {}", e)))?;
        }
        Ok(())
    }

    async fn claim_due_event(&self, now: DateTime<Utc>) -> MissionResult<Option<ExpirationEvent>> {
        let Some(next_millis) = now.timestamp_millis().max(0).checked_add(1) else {
            return Ok(None);
        };
        let upper = (next_millis as u64).to_be_bytes();

        for item in self.due_index.range(..upper.as_slice()) {
            let (index_key, id) = item
                .map_err(|e| MissionError::Storage(format!("Failed to iterate due index: {}", e)))?;

            let Some((old, event)) = self.get_event(&id)? else {
                self.drop_due_entry(&index_key);
                continue;
            };

            // Index entries outlive their event when it was re-timed or cancelled
            if event.status != EventStatus::Pending || Self::due_key(&event).as_slice() != &index_key[..] {
                self.drop_due_entry(&index_key);
                continue;
            }
            if !event.is_due(now) {
                continue;
            }

            let mut claimed = event.clone();
            claimed.status = EventStatus::Processed;
            claimed.attempts += 1;

            if self.swap_event(&old, &claimed)? {
                self.drop_due_entry(&index_key);
                return Ok(Some(claimed));
            }
            debug!("Lost claim race for event {}", event.id);
        }

        Ok(None)
    }

    async fn release_event(
        &self,
        id: &EventId,
        retry_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> MissionResult<()> {
        let (_, mut event) = self
            .get_event(id.as_str().as_bytes())?
            .ok_or_else(|| MissionError::NotFound(format!("Event {} not found", id)))?;

        event.last_error = Some(error.to_string());
        match retry_at {
            Some(at) => {
                event.status = EventStatus::Pending;
                event.expire_time = at;
            }
            None => event.status = EventStatus::Failed,
        }
        self.insert_event(&event).await
    }

    async fn cancel_events(&self, mission_id: &MissionId, filter: &EventFilter) -> MissionResult<u64> {
        let mut prefix = mission_id.as_str().as_bytes().to_vec();
        prefix.push(0);

        let mut cancelled = 0;
        for item in self.mission_events.scan_prefix(&prefix) {
            let (key, _) = item
                .map_err(|e| MissionError::Storage(format!("Failed to iterate mission events: {}", e)))?;
            let event_id = &key[prefix.len()..];

            let Some((old, event)) = self.get_event(event_id)? else {
                continue;
            };
            if event.status != EventStatus::Pending || !filter.matches(&event) {
                continue;
            }

            let mut updated = event.clone();
            updated.status = EventStatus::Cancelled;
            if self.swap_event(&old, &updated)? {
                self.drop_due_entry(&Self::due_key(&event));
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn list_events(&self, mission_id: &MissionId) -> MissionResult<Vec<ExpirationEvent>> {
        let mut prefix = mission_id.as_str().as_bytes().to_vec();
        prefix.push(0);

        let mut events = Vec::new();
        for item in self.mission_events.scan_prefix(&prefix) {
            let (key, _) = item
                .map_err(|e| MissionError::Storage(format!("Failed to iterate mission events: {}", e)))?;
            if let Some((_, event)) = self.get_event(&key[prefix.len()..])? {
                events.push(event);
            }
        }
        events.sort_by_key(|e: &ExpirationEvent| (e.expire_time, e.created_at));
        Ok(events)
    }

    // ==================== Reward claims ====================

    async fn insert_claim_log(&self, log: &RewardClaimLog) -> MissionResult<()> {
        self.claims
            .insert(log.id.as_str(), Self::serialize(log)?)
            .map_err(|e| MissionError::Storage(format!("Failed to save claim log: {}", e)))?;
        Ok(())
    }

    async fn get_claim_log(&self, id: &ClaimLogId) -> MissionResult<Option<RewardClaimLog>> {
        match self
            .claims
            .get(id.as_str())
            .map_err(|e| MissionError::Storage(format!("Failed to get claim log: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn resolve_claim_log(
        &self,
        id: &ClaimLogId,
        status: ClaimStatus,
        at: DateTime<Utc>,
    ) -> MissionResult<Option<RewardClaimLog>> {
        let old = self
            .claims
            .get(id.as_str())
            .map_err(|e| MissionError::Storage(format!("Failed to get claim log: {}", e)))?
            .ok_or_else(|| MissionError::NotFound(format!("Reward claim {} not found", id)))?;
        let mut log: RewardClaimLog = Self::deserialize(&old)?;

        if log.status != ClaimStatus::Pending {
            return Ok(None);
        }
        log.status = status;
        log.callback_time = Some(at);

        let swapped = self
            .claims
            .compare_and_swap(id.as_str(), Some(&old), Some(Self::serialize(&log)?))
            .map_err(|e| MissionError::Storage(format!("Failed to update claim log: {}", e)))?;

        Ok(swapped.ok().map(|_| log))
    }

    async fn reopen_claim_log(&self, id: &ClaimLogId, status: ClaimStatus) -> MissionResult<bool> {
        if status == ClaimStatus::Pending {
            return Ok(false);
        }
        let Some(old) = self
            .claims
            .get(id.as_str())
            .map_err(|e| MissionError::Storage(format!("Failed to get claim log: {}", e)))?
        else {
            return Ok(false);
        };
        let mut log: RewardClaimLog = Self::deserialize(&old)?;
        if log.status != status {
            return Ok(false);
        }
        log.status = ClaimStatus::Pending;
        log.callback_time = None;

        let swapped = self
            .claims
            .compare_and_swap(id.as_str(), Some(&old), Some(Self::serialize(&log)?))
            .map_err(|e| MissionError::Storage(format!("Failed to update claim log: {}", e)))?;

        Ok(swapped.is_ok())
    }

    // ==================== Message logs ====================

    async fn insert_message_log(&self, log: &MessageLog) -> MissionResult<()> {
        self.messages
            .insert(Self::message_key(log), Self::serialize(log)?)
            .map_err(|e| MissionError::Storage(format!("Failed to save message log: {}", e)))?;
        Ok(())
    }

    async fn list_message_logs(&self, user_id: &str, limit: usize) -> MissionResult<Vec<MessageLog>> {
        let mut logs = Vec::new();
        for item in self.messages.scan_prefix(Self::user_prefix(user_id)).rev() {
            if logs.len() >= limit {
                break;
            }
            let (_, value) = item
                .map_err(|e| MissionError::Storage(format!("Failed to iterate message logs: {}", e)))?;
            logs.push(Self::deserialize(&value)?);
        }
        Ok(logs)
    }

    // ==================== Configuration ====================

    async fn load_config(&self) -> MissionResult<Option<MissionConfig>> {
        match self
            .config
            .get(ACTIVE_CONFIG_KEY)
            .map_err(|e| MissionError::Storage(format!("Failed to get config: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_config(&self, config: &MissionConfig) -> MissionResult<()> {
        self.config
            .insert(ACTIVE_CONFIG_KEY, Self::serialize(config)?)
            .map_err(|e| MissionError::Storage(format!("Failed to save config: {}", e)))?;
        Ok(())
    }

    // ==================== Stats ====================

    async fn get_stats(&self) -> MissionResult<StorageStats> {
        let mut stats = StorageStats::default();

        for item in self.missions.iter() {
            let (_, value) = item
                .map_err(|e| MissionError::Storage(format!("Failed to iterate missions: {}", e)))?;
            let mission: Mission = Self::deserialize(&value)?;
            stats.total_missions += 1;
            if mission.is_active() {
                stats.active_missions += 1;
            }
        }

        for item in self.events.iter() {
            let (_, value) = item
                .map_err(|e| MissionError::Storage(format!("Failed to iterate events: {}", e)))?;
            let event: ExpirationEvent = Self::deserialize(&value)?;
            match event.status {
                EventStatus::Pending => stats.pending_events += 1,
                EventStatus::Failed => stats.failed_events += 1,
                _ => {}
            }
        }

        for item in self.claims.iter() {
            let (_, value) = item
                .map_err(|e| MissionError::Storage(format!("Failed to iterate claim logs: {}", e)))?;
            let log: RewardClaimLog = Self::deserialize(&value)?;
            if log.status == ClaimStatus::Pending {
                stats.pending_claims += 1;
            }
        }

        Ok(stats)
    }
}
