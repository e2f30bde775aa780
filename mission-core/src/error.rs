//! Mission Engine Error Types
//!
//! Error definitions shared by the engine, storage backends and collaborators.

use thiserror::Error;

/// Mission engine error
#[derive(Error, Debug)]
pub enum MissionError {
    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Mission is not in a state that allows the operation
    #[error("Not eligible: {0}")]
    NotEligible(String),

    /// Reward claim log is not pending anymore
    #[error("No matching pending reward claim found: {0}")]
    ClaimNotPending(String),

    /// Optimistic concurrency check failed
    #[error("Version conflict on mission {mission_id}: expected {expected}, found {found}")]
    Conflict {
        mission_id: String,
        expected: u64,
        found: u64,
    },

    /// Invalid state transition
    #[error("State transition error: {0}")]
    StateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// External call did not finish in time
    #[error("Timed out after {0} seconds: {1}")]
    Timeout(u64, String),

    /// Bet oracle error
    #[error("Bet oracle error: {0}")]
    Oracle(String),

    /// Notification delivery error
    #[error("Notification error: {0}")]
    Notification(String),

    /// Reward gateway refused or failed the claim
    #[error("Reward gateway error: {0}")]
    RewardGateway(String),
}

impl MissionError {
    /// Whether the scheduler should try the event again later
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MissionError::NotFound(_) | MissionError::InvalidInput(_))
    }
}

/// Mission Result type
pub type MissionResult<T> = Result<T, MissionError>;

impl From<reqwest::Error> for MissionError {
    fn from(e: reqwest::Error) -> Self {
        MissionError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for MissionError {
    fn from(e: serde_json::Error) -> Self {
        MissionError::Serialization(e.to_string())
    }
}

impl From<sled::Error> for MissionError {
    fn from(e: sled::Error) -> Self {
        MissionError::Storage(e.to_string())
    }
}
