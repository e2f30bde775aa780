//! Reward claim and callback
//!
//! A claim moves the mission to `pending` and forwards the claim to the
//! reward gateway. The external decision arrives later through
//! [`MissionEngine::reward_callback`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{MissionError, MissionResult};
use crate::reward::ClaimSubmission;
use crate::transition::{self, TransitionPlan};
use crate::types::{
    ClaimDecision, ClaimLogId, ClaimStatus, MessageTemplates, Mission, MissionConfig, MissionId,
    OperatorAlert, RewardClaimLog,
};

use super::MissionEngine;

/// Attempts at applying a callback decision when the mission keeps changing
const DECISION_ATTEMPTS: usize = 3;

/// Accepted reward claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub log: RewardClaimLog,
    pub mission: Mission,
}

/// Applied reward decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackOutcome {
    pub log_id: ClaimLogId,
    pub status: ClaimStatus,
    pub callback_time: DateTime<Utc>,
    pub message: String,
    pub mission: Mission,
}

impl MissionEngine {
    /// Claim the reward of the mission's current tier
    pub async fn claim_reward(&self, id: &MissionId) -> MissionResult<ClaimReceipt> {
        let mut mission = self.get_mission(id).await?;
        let config = self.mission_config().await?;
        let now = Utc::now();

        let (log, mut plan) = transition::begin_claim(
            &mut mission,
            self.config.engine.display_utc_offset_hours,
            now,
        )?;
        let stored = self.storage.update_mission(&mission).await?;

        // user notices wait until the gateway accepted the claim
        let notices = std::mem::take(&mut plan.notices);
        self.apply_plan(&stored, plan, &config.messages).await;

        let submission = ClaimSubmission {
            log_id: log.id.clone(),
            user_id: log.user_id.clone(),
            mission_detail: log.mission_detail.clone(),
            reward: log.reward,
            callback_url: self.config.provider.callback_url(),
            line_at: self.config.provider.line_at.clone(),
        };

        let forwarded = match self.storage.insert_claim_log(&log).await {
            Ok(()) => {
                self.bounded("reward gateway", self.gateway.submit_claim(&submission))
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = forwarded {
            return Err(self.roll_back_claim(stored, &log, &config.messages, e).await);
        }

        let alert = OperatorAlert {
            mission_id: stored.id.clone(),
            user_id: stored.user_id.clone(),
            tier: log.tier,
            level: log.level,
            reward: log.reward,
        };
        if let Err(e) = self
            .bounded("operator alert", self.dispatcher.alert_operator(&alert))
            .await
        {
            warn!("Failed to alert operators about claim {}: {}", log.id, e);
        }
        for notice in &notices {
            self.notify(notice, &config.messages).await;
        }

        info!(
            "Reward claim {} submitted for mission {} tier {} (reward {})",
            log.id, stored.id, log.tier, log.reward
        );
        Ok(ClaimReceipt {
            log,
            mission: stored,
        })
    }

    async fn roll_back_claim(
        &self,
        mission: Mission,
        log: &RewardClaimLog,
        templates: &MessageTemplates,
        cause: MissionError,
    ) -> MissionError {
        error!(
            "Reward claim {} for mission {} failed, rolling back: {}",
            log.id, mission.id, cause
        );
        let now = Utc::now();

        match self
            .storage
            .resolve_claim_log(&log.id, ClaimStatus::Reject, now)
            .await
        {
            Ok(_) | Err(MissionError::NotFound(_)) => {}
            Err(e) => error!("Failed to reject claim log {}: {}", log.id, e),
        }

        let mut mission = mission;
        let restored = match transition::rollback_claim(&mut mission, now) {
            Ok(plan) => self.commit(&mission, plan, templates).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            error!("Failed to restore mission {} after claim failure: {}", mission.id, e);
        }

        cause
    }

    /// Apply the reward system's decision on a pending claim
    ///
    /// The log is only settled once the decision is known to apply to the
    /// mission. A failure after settling puts the log back to pending so the
    /// reward system can repeat the callback.
    pub async fn reward_callback(
        &self,
        log_id: &ClaimLogId,
        status: &str,
    ) -> MissionResult<CallbackOutcome> {
        let decision = ClaimDecision::parse(status)?;
        let pending = self
            .storage
            .get_claim_log(log_id)
            .await?
            .ok_or_else(|| MissionError::NotFound(format!("Reward claim {} not found", log_id)))?;
        if pending.status != ClaimStatus::Pending {
            return Err(MissionError::ClaimNotPending(log_id.to_string()));
        }

        let config = self.mission_config().await?;
        let now = Utc::now();
        let mut preview = self.get_mission(&pending.mission_id).await?;
        decide(&mut preview, &pending, decision, &config, now)?;

        let log = self
            .storage
            .resolve_claim_log(log_id, decision.status(), now)
            .await?
            .ok_or_else(|| MissionError::ClaimNotPending(log_id.to_string()))?;

        let mission = match self.apply_decision(&log, decision, &config, now).await {
            Ok(mission) => mission,
            Err(e) => {
                self.reopen_claim(&log, decision, &e).await;
                return Err(e);
            }
        };

        let message = match decision {
            ClaimDecision::Approve => "Reward claim approved",
            ClaimDecision::Reject => "Reward claim rejected",
        };
        info!(
            "Reward claim {} for mission {} {}",
            log.id,
            mission.id,
            decision.status()
        );

        Ok(CallbackOutcome {
            log_id: log.id,
            status: decision.status(),
            callback_time: log.callback_time.unwrap_or(now),
            message: message.to_string(),
            mission,
        })
    }

    async fn reopen_claim(&self, log: &RewardClaimLog, decision: ClaimDecision, cause: &MissionError) {
        error!(
            "Failed to apply {} to mission {} for claim {}, reopening: {}",
            decision.status(),
            log.mission_id,
            log.id,
            cause
        );
        match self.storage.reopen_claim_log(&log.id, decision.status()).await {
            Ok(true) => {}
            Ok(false) => warn!("Claim {} changed before it could be reopened", log.id),
            Err(e) => error!("Failed to reopen claim {}: {}", log.id, e),
        }
    }

    /// Apply a decision to the mission, re-reading it on version conflicts
    async fn apply_decision(
        &self,
        log: &RewardClaimLog,
        decision: ClaimDecision,
        config: &MissionConfig,
        now: DateTime<Utc>,
    ) -> MissionResult<Mission> {
        let mut last_error = None;

        for _ in 0..DECISION_ATTEMPTS {
            let mut mission = self.get_mission(&log.mission_id).await?;
            let plan = decide(&mut mission, log, decision, config, now)?;

            match self.commit(&mission, plan, &config.messages).await {
                Ok(stored) => return Ok(stored),
                Err(e @ MissionError::Conflict { .. }) => {
                    warn!("Mission {} changed while applying claim {}, retrying", mission.id, log.id);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MissionError::StateTransition(format!("Could not apply claim {}", log.id))
        }))
    }
}

/// Run a claim decision against the mission it belongs to
fn decide(
    mission: &mut Mission,
    log: &RewardClaimLog,
    decision: ClaimDecision,
    config: &MissionConfig,
    now: DateTime<Utc>,
) -> MissionResult<TransitionPlan> {
    if mission.current_tier != log.tier {
        return Err(MissionError::StateTransition(format!(
            "Mission {} is at tier {}, claim {} is for tier {}",
            mission.id, mission.current_tier, log.id, log.tier
        )));
    }

    match decision {
        ClaimDecision::Approve => transition::approve_reward(mission, config, now),
        ClaimDecision::Reject => transition::reject_reward(mission, now),
    }
}
