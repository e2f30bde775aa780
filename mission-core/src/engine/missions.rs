//! Mission lifecycle operations used by the API

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{MissionError, MissionResult};
use crate::transition;
use crate::types::{ExpirationEvent, Mission, MissionId};

use super::MissionEngine;

impl MissionEngine {
    /// Start a mission at tier 1 and schedule its first level
    pub async fn create_mission(&self, user_id: &str, phone_number: &str) -> MissionResult<Mission> {
        if user_id.trim().is_empty() {
            return Err(MissionError::InvalidInput("User ID is required".to_string()));
        }
        if phone_number.trim().is_empty() {
            return Err(MissionError::InvalidInput("Phone number is required".to_string()));
        }

        let config = self.mission_config().await?;
        let (mission, plan) = transition::create_mission(user_id, phone_number, &config, Utc::now())?;

        self.storage.insert_mission(&mission).await?;
        self.apply_plan(&mission, plan, &config.messages).await;

        info!("Created mission {} for user {}", mission.id, user_id);
        Ok(mission)
    }

    pub async fn get_mission(&self, id: &MissionId) -> MissionResult<Mission> {
        self.storage
            .get_mission(id)
            .await?
            .ok_or_else(|| MissionError::NotFound(format!("Mission {} not found", id)))
    }

    /// Most recently created mission of a user, whatever its status
    pub async fn latest_mission(&self, user_id: &str) -> MissionResult<Mission> {
        self.storage
            .latest_mission_for_user(user_id)
            .await?
            .ok_or_else(|| MissionError::NotFound("No processing mission found".to_string()))
    }

    pub async fn has_active_mission(&self, user_id: &str) -> MissionResult<bool> {
        self.storage.has_active_mission(user_id).await
    }

    pub async fn mission_events(&self, id: &MissionId) -> MissionResult<Vec<ExpirationEvent>> {
        self.storage.list_events(id).await
    }

    /// Resolve the open level of a tier right away.
    ///
    /// `tier_index` is the 0-based position in the mission's tier list.
    pub async fn update_status(&self, id: &MissionId, tier_index: usize) -> MissionResult<Mission> {
        let mut mission = self.get_mission(id).await?;
        let tier = mission.tiers.get(tier_index).ok_or_else(|| {
            MissionError::InvalidInput(format!("Invalid tier index {}", tier_index))
        })?;
        let tier_number = tier.number;
        let (start, end) = tier
            .open_level()
            .map(|level| (level.start_date, level.expire_date))
            .ok_or_else(|| {
                MissionError::StateTransition(format!("Tier {} has no open level", tier_number))
            })?;

        let config = self.mission_config().await?;
        let activity = self.measure_activity(&mission.user_id, start, end).await;
        let (outcome, plan) =
            transition::resolve_open_level(&mut mission, &config, tier_number, activity, Utc::now())?;
        let stored = self.commit(&mission, plan, &config.messages).await?;

        info!(
            "Mission {} tier {} updated on request with activity {:.2}: {:?}",
            stored.id, tier_number, activity, outcome
        );
        Ok(stored)
    }

    /// Wager total of a user over a window, straight from the oracle
    pub async fn activity(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MissionResult<f64> {
        if end < start {
            return Err(MissionError::InvalidInput(
                "end_date must not be before start_date".to_string(),
            ));
        }
        self.bounded("bet oracle", self.oracle.get_activity(user_id, start, end))
            .await
    }
}
