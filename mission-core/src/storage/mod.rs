//! Mission Storage
//!
//! Persistence interface for missions, expiration events, reward claim logs
//! and the active tier configuration.
//!
//! # Guarantees
//!
//! - `claim_due_event` moves one event from pending to processed atomically;
//!   of several concurrent callers at most one receives a given event
//! - `update_mission` only writes when the stored version matches
//! - `resolve_claim_log` only changes a log that is still pending, and
//!   `reopen_claim_log` only reverts a log that still carries its decision

pub mod memory;
pub mod sled;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MissionResult;
use crate::types::{
    ClaimLogId, ClaimStatus, EventFilter, EventId, ExpirationEvent, MessageLog, Mission,
    MissionConfig, MissionId, RewardClaimLog,
};

/// Mission storage interface
#[async_trait]
pub trait MissionStorage: Send + Sync {
    // ==================== Missions ====================

    /// Store a new mission
    async fn insert_mission(&self, mission: &Mission) -> MissionResult<()>;

    async fn get_mission(&self, id: &MissionId) -> MissionResult<Option<Mission>>;

    /// Replace a mission if its stored version equals `mission.version`.
    ///
    /// Returns the stored copy with the version incremented, or
    /// `MissionError::Conflict` when another writer got there first.
    async fn update_mission(&self, mission: &Mission) -> MissionResult<Mission>;

    /// Most recently created mission of a user
    async fn latest_mission_for_user(&self, user_id: &str) -> MissionResult<Option<Mission>>;

    /// Whether the user has a processing or pending mission
    async fn has_active_mission(&self, user_id: &str) -> MissionResult<bool>;

    // ==================== Events ====================

    async fn insert_event(&self, event: &ExpirationEvent) -> MissionResult<()>;

    /// Claim the earliest pending event with `expire_time <= now`
    async fn claim_due_event(&self, now: DateTime<Utc>) -> MissionResult<Option<ExpirationEvent>>;

    /// Hand a claimed event back after a handler failure.
    ///
    /// `Some(at)` re-queues it as pending at `at`; `None` quarantines it.
    async fn release_event(
        &self,
        id: &EventId,
        retry_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> MissionResult<()>;

    /// Cancel pending events of a mission selected by `filter`; returns the count
    async fn cancel_events(&self, mission_id: &MissionId, filter: &EventFilter) -> MissionResult<u64>;

    /// Every event of a mission, ordered by expire time
    async fn list_events(&self, mission_id: &MissionId) -> MissionResult<Vec<ExpirationEvent>>;

    // ==================== Reward claims ====================

    async fn insert_claim_log(&self, log: &RewardClaimLog) -> MissionResult<()>;

    async fn get_claim_log(&self, id: &ClaimLogId) -> MissionResult<Option<RewardClaimLog>>;

    /// Settle a pending log.
    ///
    /// Returns `Ok(None)` when the log exists but is no longer pending and
    /// `MissionError::NotFound` when it does not exist.
    async fn resolve_claim_log(
        &self,
        id: &ClaimLogId,
        status: ClaimStatus,
        at: DateTime<Utc>,
    ) -> MissionResult<Option<RewardClaimLog>>;

    /// Put a settled log back to pending after its decision could not be applied.
    ///
    /// Only acts when the log still carries `status`; returns whether it did.
    async fn reopen_claim_log(&self, id: &ClaimLogId, status: ClaimStatus) -> MissionResult<bool>;

    // ==================== Message logs ====================

    async fn insert_message_log(&self, log: &MessageLog) -> MissionResult<()>;

    /// Messages sent to a user, newest first, at most `limit`
    async fn list_message_logs(&self, user_id: &str, limit: usize) -> MissionResult<Vec<MessageLog>>;

    // ==================== Configuration ====================

    async fn load_config(&self) -> MissionResult<Option<MissionConfig>>;

    async fn save_config(&self, config: &MissionConfig) -> MissionResult<()>;

    // ==================== Stats ====================

    async fn get_stats(&self) -> MissionResult<StorageStats>;
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_missions: u64,
    pub active_missions: u64,
    pub pending_events: u64,
    /// Events quarantined after repeated failures
    pub failed_events: u64,
    pub pending_claims: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled data directory; empty selects in-memory storage
    pub data_dir: String,
    /// Sled page cache size in bytes
    pub cache_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./mission_data".to_string(),
            cache_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl StorageConfig {
    /// Load from MISSION_DATA_DIR, falling back to the default directory
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("MISSION_DATA_DIR")
                .unwrap_or_else(|_| Self::default().data_dir),
            ..Self::default()
        }
    }

    /// In-memory configuration for tests
    pub fn test() -> Self {
        Self {
            data_dir: String::new(),
            cache_size: 4 * 1024 * 1024, // 4MB
        }
    }

    pub fn is_memory(&self) -> bool {
        self.data_dir.is_empty()
    }
}

pub use memory::MemoryStorage;
pub use self::sled::SledStorage;

/// Open the backend selected by `config`
pub fn open_storage(config: &StorageConfig) -> MissionResult<std::sync::Arc<dyn MissionStorage>> {
    if config.is_memory() {
        Ok(std::sync::Arc::new(MemoryStorage::new()))
    } else {
        Ok(std::sync::Arc::new(SledStorage::new(config)?))
    }
}
