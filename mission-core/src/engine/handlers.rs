//! Expiration event handlers
//!
//! Events only address a mission, tier and level. Each handler re-reads the
//! mission and the tier configuration and decides from that state whether
//! the event still applies.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::error::{MissionError, MissionResult};
use crate::transition;
use crate::types::{
    EventType, ExpirationEvent, MessageKind, Mission, MissionConfig, MissionStatus, Notice, Tier,
    TierStatus,
};

use super::MissionEngine;

/// Upper bound on the backoff between handler attempts
const MAX_RETRY_DELAY_SECS: u64 = 24 * 60 * 60;

/// Result of processing one claimed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The event applied
    Handled,
    /// The mission moved on; nothing to do
    Skipped,
    /// The handler failed; the event is pending again
    Retried { attempts: u32 },
    /// The handler failed for good; the event is parked as failed
    Quarantined,
}

impl MissionEngine {
    /// Claim and handle the earliest due event.
    ///
    /// Returns `None` when nothing is due.
    pub async fn process_next_event(
        &self,
        now: DateTime<Utc>,
    ) -> MissionResult<Option<EventDisposition>> {
        let event = match self.storage.claim_due_event(now).await? {
            Some(event) => event,
            None => return Ok(None),
        };

        debug!(
            "Claimed {} event {} for mission {} tier {} level {}",
            event.event_type, event.id, event.mission_id, event.tier, event.level
        );

        let disposition = match self.handle_event(&event, now).await {
            Ok(disposition) => disposition,
            Err(e) => self.release_failed(&event, &e, now).await?,
        };
        Ok(Some(disposition))
    }

    /// Run the handler for an event that has already been claimed
    pub async fn handle_event(
        &self,
        event: &ExpirationEvent,
        now: DateTime<Utc>,
    ) -> MissionResult<EventDisposition> {
        let mission = self
            .storage
            .get_mission(&event.mission_id)
            .await?
            .ok_or_else(|| MissionError::NotFound(format!("Mission {} not found", event.mission_id)))?;
        let config = self.mission_config().await?;

        let disposition = match event.event_type {
            EventType::LevelExpiration => self.on_level_expiration(mission, &config, event, now).await?,
            EventType::FollowUp => self.on_follow_up(&mission, &config, event).await,
            EventType::RewardExpiration => {
                self.on_reward_expiration(mission, &config, event, now).await?
            }
            EventType::RewardNotification | EventType::RecurringRewardNotification => {
                self.on_reward_reminder(&mission, &config, event, now).await
            }
        };

        if disposition == EventDisposition::Skipped {
            info!(
                "Skipped stale {} event {} for mission {} tier {} level {}",
                event.event_type, event.id, event.mission_id, event.tier, event.level
            );
        }
        Ok(disposition)
    }

    async fn release_failed(
        &self,
        event: &ExpirationEvent,
        err: &MissionError,
        now: DateTime<Utc>,
    ) -> MissionResult<EventDisposition> {
        let max_attempts = self.config.engine.max_event_attempts;

        if !err.is_retryable() || event.attempts >= max_attempts {
            error!(
                "Quarantining {} event {} of mission {} after {} attempts: {}",
                event.event_type, event.id, event.mission_id, event.attempts, err
            );
            self.storage.release_event(&event.id, None, &err.to_string()).await?;
            return Ok(EventDisposition::Quarantined);
        }

        let delay_secs = self
            .config
            .engine
            .retry_delay_secs
            .saturating_mul(u64::from(event.attempts))
            .min(MAX_RETRY_DELAY_SECS);
        let retry_at = now + Duration::seconds(delay_secs as i64);
        warn!(
            "Handler for {} event {} failed (attempt {}), retrying at {}: {}",
            event.event_type, event.id, event.attempts, retry_at, err
        );
        self.storage
            .release_event(&event.id, Some(retry_at), &err.to_string())
            .await?;
        Ok(EventDisposition::Retried {
            attempts: event.attempts,
        })
    }

    async fn on_level_expiration(
        &self,
        mut mission: Mission,
        config: &MissionConfig,
        event: &ExpirationEvent,
        now: DateTime<Utc>,
    ) -> MissionResult<EventDisposition> {
        if mission.status != MissionStatus::Processing || mission.current_tier != event.tier {
            return Ok(EventDisposition::Skipped);
        }

        let window = match mission.current().and_then(Tier::open_level) {
            Some(level) if level.expire_date <= now => (level.start_date, level.expire_date),
            _ => return Ok(EventDisposition::Skipped),
        };

        let activity = self.measure_activity(&mission.user_id, window.0, window.1).await;
        let (outcome, plan) =
            transition::resolve_open_level(&mut mission, config, event.tier, activity, now)?;
        let stored = self.commit(&mission, plan, &config.messages).await?;

        info!(
            "Mission {} tier {} level resolved with activity {:.2}: {:?}",
            stored.id, event.tier, activity, outcome
        );
        Ok(EventDisposition::Handled)
    }

    async fn on_follow_up(
        &self,
        mission: &Mission,
        config: &MissionConfig,
        event: &ExpirationEvent,
    ) -> EventDisposition {
        let tier = match mission.tier(event.tier) {
            Some(tier) if mission.status == MissionStatus::Processing => tier,
            _ => return EventDisposition::Skipped,
        };
        let level = match tier.level(event.level) {
            Some(level) if level.is_open() => level,
            _ => return EventDisposition::Skipped,
        };

        let activity = self
            .measure_activity(&mission.user_id, level.start_date, level.expire_date)
            .await;
        let notice = Notice::new(
            mission.user_id.clone(),
            mission.id.clone(),
            tier.number,
            level.number,
            MessageKind::Followup,
        )
        .with("target", tier.target)
        .with("currentBet", format!("{:.2}", activity));

        self.notify(&notice, &config.messages).await;
        EventDisposition::Handled
    }

    async fn on_reward_expiration(
        &self,
        mut mission: Mission,
        config: &MissionConfig,
        event: &ExpirationEvent,
        now: DateTime<Utc>,
    ) -> MissionResult<EventDisposition> {
        let plan = match transition::expire_reward(&mut mission, config, event.tier, now)? {
            Some(plan) => plan,
            None => return Ok(EventDisposition::Skipped),
        };
        let stored = self.commit(&mission, plan, &config.messages).await?;

        match stored.status {
            MissionStatus::Failed => info!(
                "Reward of mission {} tier {} lapsed on the last tier, mission failed",
                stored.id, event.tier
            ),
            _ => info!(
                "Reward of mission {} tier {} lapsed, tier {} started",
                stored.id, event.tier, stored.current_tier
            ),
        }
        Ok(EventDisposition::Handled)
    }

    async fn on_reward_reminder(
        &self,
        mission: &Mission,
        config: &MissionConfig,
        event: &ExpirationEvent,
        now: DateTime<Utc>,
    ) -> EventDisposition {
        let tier = match mission.current() {
            Some(tier)
                if tier.number == event.tier
                    && tier.status == TierStatus::AwaitingReward
                    && mission.status == MissionStatus::Processing =>
            {
                tier
            }
            _ => return EventDisposition::Skipped,
        };
        let deadline = match tier.expire_reward {
            Some(deadline) if deadline > now => deadline,
            _ => return EventDisposition::Skipped,
        };

        let remaining_days = (deadline - now).num_hours() / 24;
        let notice = Notice::new(
            mission.user_id.clone(),
            mission.id.clone(),
            tier.number,
            tier.current_level,
            MessageKind::RewardNotification,
        )
        .with("remainingDays", remaining_days);

        self.notify(&notice, &config.messages).await;
        EventDisposition::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{harness, Harness};
    use super::*;
    use crate::storage::MissionStorage;
    use crate::types::{EventStatus, LevelStatus, MissionId};

    async fn drain(h: &Harness, at: DateTime<Utc>) -> Vec<EventDisposition> {
        let mut dispositions = Vec::new();
        while let Some(d) = h.engine.process_next_event(at).await.unwrap() {
            dispositions.push(d);
        }
        dispositions
    }

    async fn pending_events(h: &Harness, id: &MissionId) -> Vec<ExpirationEvent> {
        h.storage
            .list_events(id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.status == EventStatus::Pending)
            .collect()
    }

    #[tokio::test]
    async fn test_nothing_due() {
        let h = harness().await;
        assert!(h.engine.process_next_event(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_level_success_at_target_advances() {
        let h = harness().await;
        let mission = h.engine.create_mission("U1", "0800000000").await.unwrap();
        h.oracle.set(Some(1000.0));

        let at = Utc::now() + Duration::hours(25);
        let dispositions = drain(&h, at).await;
        assert_eq!(
            dispositions,
            vec![EventDisposition::Handled, EventDisposition::Handled]
        );

        let stored = h.storage.get_mission(&mission.id).await.unwrap().unwrap();
        let tier = stored.current().unwrap();
        assert_eq!(tier.levels[0].status, LevelStatus::Success);
        assert_eq!(tier.current_level, 2);
        assert_eq!(tier.status, TierStatus::Processing);

        let pending = pending_events(&h, &mission.id).await;
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|e| e.level == 2));

        let kinds: Vec<_> = h.dispatcher.messages().iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageKind::Followup, MessageKind::MissionSuccess]);
    }

    #[tokio::test]
    async fn test_second_level_shortfall_fails_mission() {
        let h = harness().await;
        let mission = h.engine.create_mission("U1", "0800000000").await.unwrap();
        h.oracle.set(Some(1000.0));
        let first = Utc::now() + Duration::hours(25);
        drain(&h, first).await;

        h.oracle.set(Some(500.0));
        drain(&h, first + Duration::hours(25)).await;

        let stored = h.storage.get_mission(&mission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MissionStatus::Failed);
        assert_eq!(stored.current().unwrap().status, TierStatus::Failed);
        assert_eq!(stored.current().unwrap().levels[1].status, LevelStatus::Failed);
        assert!(pending_events(&h, &mission.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_oracle_failure_counts_as_zero() {
        let h = harness().await;
        let mission = h.engine.create_mission("U1", "0800000000").await.unwrap();
        h.oracle.set(None);

        drain(&h, Utc::now() + Duration::hours(25)).await;
        let stored = h.storage.get_mission(&mission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MissionStatus::Failed);
        assert_eq!(stored.current().unwrap().levels[0].current_bet, 0.0);
    }

    #[tokio::test]
    async fn test_reward_lapse_starts_next_tier() {
        let h = harness().await;
        let mission = h.engine.create_mission("U1", "0800000000").await.unwrap();
        h.oracle.set(Some(1000.0));

        let t1 = Utc::now() + Duration::hours(25);
        drain(&h, t1).await;
        let t2 = t1 + Duration::hours(25);
        drain(&h, t2).await;

        let stored = h.storage.get_mission(&mission.id).await.unwrap().unwrap();
        assert_eq!(stored.current().unwrap().status, TierStatus::AwaitingReward);

        // reminder 24h before the 72h deadline
        let dispositions = drain(&h, t2 + Duration::hours(49)).await;
        assert_eq!(dispositions, vec![EventDisposition::Handled]);
        let reminder = h
            .dispatcher
            .messages()
            .into_iter()
            .find(|m| m.kind == MessageKind::RewardNotification);
        assert!(reminder.is_some());

        let dispositions = drain(&h, t2 + Duration::hours(73)).await;
        assert_eq!(dispositions, vec![EventDisposition::Handled]);

        let stored = h.storage.get_mission(&mission.id).await.unwrap().unwrap();
        assert_eq!(stored.tiers[0].status, TierStatus::ExpireReward);
        assert_eq!(stored.current_tier, 2);
        assert_eq!(stored.status, MissionStatus::Processing);
        let pending = pending_events(&h, &mission.id).await;
        assert!(pending.iter().all(|e| e.tier == 2));
    }

    #[tokio::test]
    async fn test_stale_level_event_is_skipped() {
        let h = harness().await;
        let mission = h.engine.create_mission("U1", "0800000000").await.unwrap();

        let stale = ExpirationEvent::new(
            mission.id.clone(),
            2,
            1,
            EventType::LevelExpiration,
            Utc::now(),
            Utc::now(),
        );
        h.storage.insert_event(&stale).await.unwrap();

        let disposition = h.engine.process_next_event(Utc::now()).await.unwrap();
        assert_eq!(disposition, Some(EventDisposition::Skipped));
        let stored = h.storage.get_mission(&mission.id).await.unwrap().unwrap();
        assert_eq!(stored.version, mission.version);
    }

    #[tokio::test]
    async fn test_missing_mission_is_quarantined() {
        let h = harness().await;
        let orphan = ExpirationEvent::new(
            MissionId::from("missing"),
            1,
            1,
            EventType::FollowUp,
            Utc::now(),
            Utc::now(),
        );
        h.storage.insert_event(&orphan).await.unwrap();

        let disposition = h.engine.process_next_event(Utc::now()).await.unwrap();
        assert_eq!(disposition, Some(EventDisposition::Quarantined));
        let events = h.storage.list_events(&orphan.mission_id).await.unwrap();
        assert_eq!(events[0].status, EventStatus::Failed);
        assert!(events[0].last_error.is_some());
    }

    #[tokio::test]
    async fn test_failing_handler_retries_then_quarantines() {
        let h = harness().await;
        let mission = h.engine.create_mission("U1", "0800000000").await.unwrap();
        // no configuration: every handler run fails with a retryable error
        h.storage.clear().await;
        h.storage.insert_mission(&mission).await.unwrap();
        let event = ExpirationEvent::new(
            mission.id.clone(),
            1,
            1,
            EventType::FollowUp,
            Utc::now(),
            Utc::now(),
        );
        h.storage.insert_event(&event).await.unwrap();

        let now = Utc::now();
        assert_eq!(
            h.engine.process_next_event(now).await.unwrap(),
            Some(EventDisposition::Retried { attempts: 1 })
        );
        // not due again until the retry delay passed
        assert!(h.engine.process_next_event(now).await.unwrap().is_none());

        let later = now + Duration::seconds(5);
        assert_eq!(
            h.engine.process_next_event(later).await.unwrap(),
            Some(EventDisposition::Retried { attempts: 2 })
        );
        let last = later + Duration::seconds(10);
        assert_eq!(
            h.engine.process_next_event(last).await.unwrap(),
            Some(EventDisposition::Quarantined)
        );
        assert!(h.engine.process_next_event(last + Duration::days(1)).await.unwrap().is_none());
    }
}
