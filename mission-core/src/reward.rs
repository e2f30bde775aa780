//! Reward Gateway
//!
//! Forwards reward claims to the external reward system. Its decision comes
//! back later through the reward callback.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::{MissionError, MissionResult};
use crate::types::{ClaimLogId, Tier};

/// Claim payload sent to the reward system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSubmission {
    pub log_id: ClaimLogId,
    pub user_id: String,
    pub mission_detail: String,
    pub reward: u64,
    pub callback_url: String,
    pub line_at: String,
}

/// External reward system
#[async_trait]
pub trait RewardGateway: Send + Sync {
    /// Forward a claim; an error means the claim was not accepted
    async fn submit_claim(&self, claim: &ClaimSubmission) -> MissionResult<()>;
}

/// Gateway backed by the wager provider's claim endpoint
pub struct HttpRewardGateway {
    client: Client,
    config: ProviderConfig,
}

impl HttpRewardGateway {
    pub fn new(config: ProviderConfig) -> MissionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MissionError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl RewardGateway for HttpRewardGateway {
    async fn submit_claim(&self, claim: &ClaimSubmission) -> MissionResult<()> {
        let url = format!(
            "{}/players/v1/line/rewards/claim",
            self.config.api_endpoint.trim_end_matches('/')
        );
        info!("Submitting reward claim {} for user {}", claim.log_id, claim.user_id);

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(claim)
            .send()
            .await
            .map_err(|e| MissionError::RewardGateway(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!("Reward gateway responded {}: {}", status, body);

        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            return Err(MissionError::RewardGateway(format!(
                "Gateway returned status {}",
                status
            )));
        }
        Ok(())
    }
}

/// Gateway that records submissions in memory
#[derive(Debug)]
pub struct MemoryRewardGateway {
    accept: AtomicBool,
    submissions: Mutex<Vec<ClaimSubmission>>,
}

impl Default for MemoryRewardGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRewardGateway {
    pub fn new() -> Self {
        Self {
            accept: AtomicBool::new(true),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Make later submissions fail or succeed
    pub fn set_accepting(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<ClaimSubmission> {
        self.submissions.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RewardGateway for MemoryRewardGateway {
    async fn submit_claim(&self, claim: &ClaimSubmission) -> MissionResult<()> {
        if !self.accept.load(Ordering::SeqCst) {
            return Err(MissionError::RewardGateway("Gateway returned status 503".to_string()));
        }
        self.submissions
            .lock()
            .map_err(|_| MissionError::RewardGateway("recorder poisoned".to_string()))?
            .push(claim.clone());
        Ok(())
    }
}

/// Human-readable summary of a completed tier for the claim log
pub fn mission_detail(tier: &Tier, utc_offset_hours: i32) -> String {
    let shift = chrono::Duration::hours(i64::from(utc_offset_hours.clamp(-23, 23)));

    let start = tier.levels.iter().map(|l| l.start_date).min();
    let end = tier.levels.iter().map(|l| l.expire_date).max();
    let window = match (start, end) {
        (Some(start), Some(end)) => format!(
            "{} - {}",
            (start + shift).format("%d/%m/%Y %H:%M"),
            (end + shift).format("%d/%m/%Y %H:%M")
        ),
        _ => "-".to_string(),
    };

    format!(
        "Tier {} complete, {}, total wager {:.2}",
        tier.number,
        window,
        tier.total_bet()
    )
}
