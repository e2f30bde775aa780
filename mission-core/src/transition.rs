//! Mission transitions
//!
//! Pure state changes shared by the event processor and the mission API.
//! Each function mutates the mission in place and returns a [`TransitionPlan`]
//! describing the events to enqueue, the pending events to cancel and the
//! notices to send once the mission write has succeeded.

use chrono::{DateTime, Duration, Utc};

use crate::error::{MissionError, MissionResult};
use crate::reward::mission_detail;
use crate::types::{
    ClaimLogId, ClaimStatus, EventFilter, EventType, ExpirationEvent, Level, LevelStatus,
    MessageKind, Mission, MissionConfig, MissionId, MissionStatus, Notice, RewardClaimLog, Tier,
    TierConfig, TierStatus,
};

/// Upper bound on reminders generated for one reward deadline
pub const MAX_REWARD_REMINDERS: usize = 500;

/// Side effects of a transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionPlan {
    pub events: Vec<ExpirationEvent>,
    pub cancellations: Vec<EventFilter>,
    pub notices: Vec<Notice>,
}

impl TransitionPlan {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.cancellations.is_empty() && self.notices.is_empty()
    }
}

/// How a level resolution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    /// Target met, next level opened
    Advanced,
    /// Target met on the final level, reward waiting to be claimed
    TierCompleted,
    /// Target missed on the recurring tier, new level opened
    Retried { consecutive_fails: u32 },
    /// Target missed, mission over
    MissionFailed,
}

fn tier_config<'a>(config: &'a MissionConfig, number: u32) -> MissionResult<&'a TierConfig> {
    config
        .tier(number)
        .ok_or_else(|| MissionError::Configuration(format!("No configuration for tier {}", number)))
}

fn current_tier_mut(mission: &mut Mission) -> MissionResult<&mut Tier> {
    let id = mission.id.clone();
    let number = mission.current_tier;
    mission.current_mut().ok_or_else(|| {
        MissionError::StateTransition(format!("Mission {} has no tier {}", id, number))
    })
}

/// Events for a freshly opened level
fn level_events(
    mission_id: &MissionId,
    config: &TierConfig,
    level: &Level,
    now: DateTime<Utc>,
) -> Vec<ExpirationEvent> {
    let mut events = vec![ExpirationEvent::new(
        mission_id.clone(),
        config.tier,
        level.number,
        EventType::LevelExpiration,
        level.expire_date + config.processing_delay(),
        now,
    )];

    if config.follow_up_hours > 0 && level.follow_up_date < level.expire_date {
        events.push(ExpirationEvent::new(
            mission_id.clone(),
            config.tier,
            level.number,
            EventType::FollowUp,
            level.follow_up_date,
            now,
        ));
    }

    events
}

fn open_next_level(
    mission: &mut Mission,
    config: &TierConfig,
    now: DateTime<Utc>,
    plan: &mut TransitionPlan,
) -> MissionResult<()> {
    let mission_id = mission.id.clone();
    let tier = mission.tier_mut(config.tier).ok_or_else(|| {
        MissionError::StateTransition(format!("Mission {} has no tier {}", mission_id, config.tier))
    })?;

    tier.status = TierStatus::Processing;
    let level = tier.push_level(config, now).clone();
    plan.events.extend(level_events(&mission_id, config, &level, now));
    Ok(())
}

fn start_tier(
    mission: &mut Mission,
    config: &TierConfig,
    now: DateTime<Utc>,
    plan: &mut TransitionPlan,
) -> MissionResult<()> {
    if mission.tier(config.tier).is_some() {
        return Err(MissionError::StateTransition(format!(
            "Mission {} already started tier {}",
            mission.id, config.tier
        )));
    }

    let tier = Tier::start(config, now);
    let first_level = tier.levels[0].clone();
    mission.tiers.push(tier);
    mission.current_tier = config.tier;
    mission.status = MissionStatus::Processing;
    mission.consecutive_fails = 0;

    plan.events.extend(level_events(&mission.id, config, &first_level, now));
    Ok(())
}

/// Set the reward deadline of the current tier and schedule its events
fn schedule_reward(
    mission: &mut Mission,
    config: &TierConfig,
    now: DateTime<Utc>,
    plan: &mut TransitionPlan,
) -> MissionResult<DateTime<Utc>> {
    let mission_id = mission.id.clone();
    let tier = current_tier_mut(mission)?;
    let deadline = now + config.expire_reward_after();
    tier.expire_reward = Some(deadline);
    let level = tier.current_level;

    let event = |event_type, at| {
        ExpirationEvent::new(mission_id.clone(), config.tier, level, event_type, at, now)
    };

    plan.events.push(event(EventType::RewardExpiration, deadline));

    if config.recurring {
        let interval = config.notify_interval();
        if interval > Duration::zero() {
            let mut at = now + interval;
            let mut count = 0;
            while at < deadline && count < MAX_REWARD_REMINDERS {
                plan.events.push(event(EventType::RecurringRewardNotification, at));
                at += interval;
                count += 1;
            }
        }
    } else if config.notify_before_expire_hours > 0 {
        let at = (deadline - config.notify_before_expire()).max(now);
        plan.events.push(event(EventType::RewardNotification, at));
    }

    Ok(deadline)
}

/// Re-queue the reward deadline after a claim did not go through
fn rearm_reward(mission: &Mission, now: DateTime<Utc>, plan: &mut TransitionPlan) {
    if let Some(tier) = mission.current() {
        if let Some(deadline) = tier.expire_reward {
            plan.events.push(ExpirationEvent::new(
                mission.id.clone(),
                tier.number,
                tier.current_level,
                EventType::RewardExpiration,
                deadline,
                now,
            ));
        }
    }
}

fn fail_mission(mission: &mut Mission, tier_number: u32) {
    if let Some(tier) = mission.tier_mut(tier_number) {
        tier.status = TierStatus::Failed;
    }
    mission.status = MissionStatus::Failed;
}

/// Create a mission at tier 1 with its first level scheduled
pub fn create_mission(
    user_id: &str,
    phone_number: &str,
    config: &MissionConfig,
    now: DateTime<Utc>,
) -> MissionResult<(Mission, TransitionPlan)> {
    let first = config
        .first_tier()
        .ok_or_else(|| MissionError::Configuration("No tier configuration found".to_string()))?;

    let mission = Mission::new(user_id, phone_number, first, now);
    let mut plan = TransitionPlan::default();
    if let Some(level) = mission.current().and_then(Tier::open_level) {
        plan.events.extend(level_events(&mission.id, first, level, now));
    }
    Ok((mission, plan))
}

/// Resolve the open level of `tier_number` against the measured activity
pub fn resolve_open_level(
    mission: &mut Mission,
    config: &MissionConfig,
    tier_number: u32,
    activity: f64,
    now: DateTime<Utc>,
) -> MissionResult<(LevelOutcome, TransitionPlan)> {
    if mission.status != MissionStatus::Processing {
        return Err(MissionError::StateTransition(format!(
            "Mission {} is not processing",
            mission.id
        )));
    }
    if mission.current_tier != tier_number {
        return Err(MissionError::StateTransition(format!(
            "Tier {} is not the current tier of mission {}",
            tier_number, mission.id
        )));
    }

    let tier_cfg = tier_config(config, tier_number)?;
    let mission_id = mission.id.clone();
    let user_id = mission.user_id.clone();

    let (level_no, target, current_level, max_level, success) = {
        let tier = current_tier_mut(mission)?;
        let target = tier.target;
        let current_level = tier.current_level;
        let max_level = tier.max_level;
        let level = tier.open_level_mut().ok_or_else(|| {
            MissionError::StateTransition(format!(
                "Tier {} of mission {} has no open level",
                tier_number, mission_id
            ))
        })?;

        let success = activity >= target as f64;
        level.current_bet = activity;
        level.status = if success {
            LevelStatus::Success
        } else {
            LevelStatus::Failed
        };
        (level.number, target, current_level, max_level, success)
    };

    let mut plan = TransitionPlan::default();
    plan.cancellations.push(EventFilter::level(tier_number, level_no));

    let notice = |kind| Notice::new(user_id.clone(), mission_id.clone(), tier_number, level_no, kind);

    let outcome = if success {
        mission.consecutive_fails = 0;

        if current_level >= max_level {
            current_tier_mut(mission)?.status = TierStatus::AwaitingReward;
            schedule_reward(mission, tier_cfg, now, &mut plan)?;
            plan.notices.push(
                notice(MessageKind::MissionComplete)
                    .with("expireRewardDays", tier_cfg.expire_reward_hours / 24),
            );
            LevelOutcome::TierCompleted
        } else {
            open_next_level(mission, tier_cfg, now, &mut plan)?;
            plan.notices.push(notice(MessageKind::MissionSuccess));
            LevelOutcome::Advanced
        }
    } else {
        plan.notices
            .push(notice(MessageKind::MissionFailed).with("target", target));

        if tier_cfg.recurring {
            mission.consecutive_fails += 1;
            if mission.consecutive_fails >= tier_cfg.max_consecutive_fails {
                fail_mission(mission, tier_number);
                LevelOutcome::MissionFailed
            } else {
                open_next_level(mission, tier_cfg, now, &mut plan)?;
                LevelOutcome::Retried {
                    consecutive_fails: mission.consecutive_fails,
                }
            }
        } else {
            fail_mission(mission, tier_number);
            LevelOutcome::MissionFailed
        }
    };

    mission.updated_at = now;
    Ok((outcome, plan))
}

/// Lapse the reward of `tier_number` once its deadline has passed.
///
/// Returns `None` when the mission moved on since the event was scheduled.
pub fn expire_reward(
    mission: &mut Mission,
    config: &MissionConfig,
    tier_number: u32,
    now: DateTime<Utc>,
) -> MissionResult<Option<TransitionPlan>> {
    if mission.current_tier != tier_number || mission.status != MissionStatus::Processing {
        return Ok(None);
    }

    let tier = current_tier_mut(mission)?;
    let deadline_passed = tier.expire_reward.map_or(false, |deadline| now >= deadline);
    if !tier.is_claimable() || !deadline_passed {
        return Ok(None);
    }
    tier.status = TierStatus::ExpireReward;

    let mut plan = TransitionPlan::default();
    plan.cancellations.push(EventFilter::reward());

    match config.next_tier(tier_number) {
        Some(next) => start_tier(mission, next, now, &mut plan)?,
        None => mission.status = MissionStatus::Failed,
    }

    mission.updated_at = now;
    Ok(Some(plan))
}

/// Move the current tier into the claimed state and build its claim log
pub fn begin_claim(
    mission: &mut Mission,
    utc_offset_hours: i32,
    now: DateTime<Utc>,
) -> MissionResult<(RewardClaimLog, TransitionPlan)> {
    if mission.status != MissionStatus::Processing {
        return Err(MissionError::NotEligible(format!(
            "Mission {} is {:?}",
            mission.id, mission.status
        )));
    }

    let mission_id = mission.id.clone();
    let user_id = mission.user_id.clone();
    let tier = mission
        .current_mut()
        .filter(|t| t.is_claimable())
        .ok_or_else(|| {
            MissionError::NotEligible("Current tier is not eligible for reward".to_string())
        })?;

    let log = RewardClaimLog {
        id: ClaimLogId::generate(),
        user_id: user_id.clone(),
        mission_id: mission_id.clone(),
        tier: tier.number,
        level: tier.current_level,
        mission_detail: mission_detail(tier, utc_offset_hours),
        reward: tier.reward,
        status: ClaimStatus::Pending,
        created_at: now,
        callback_time: None,
    };
    tier.status = TierStatus::Pending;
    mission.status = MissionStatus::Pending;
    mission.updated_at = now;

    let mut plan = TransitionPlan::default();
    plan.cancellations.push(EventFilter::reward());
    plan.notices.push(Notice::new(
        user_id,
        mission_id,
        log.tier,
        log.level,
        MessageKind::GetReward,
    ));

    Ok((log, plan))
}

fn require_pending_claim(mission: &mut Mission) -> MissionResult<&mut Tier> {
    if mission.status != MissionStatus::Pending {
        return Err(MissionError::StateTransition(format!(
            "Mission {} has no claim in progress",
            mission.id
        )));
    }
    let tier = current_tier_mut(mission)?;
    if tier.status != TierStatus::Pending {
        return Err(MissionError::StateTransition(format!(
            "Tier {} has no claim in progress",
            tier.number
        )));
    }
    Ok(tier)
}

/// Apply an approved reward: advance to the next tier or level
pub fn approve_reward(
    mission: &mut Mission,
    config: &MissionConfig,
    now: DateTime<Utc>,
) -> MissionResult<TransitionPlan> {
    let tier = require_pending_claim(mission)?;
    tier.status = TierStatus::Completed;
    let tier_number = tier.number;

    mission.consecutive_fails = 0;
    let tier_cfg = tier_config(config, tier_number)?;
    let mut plan = TransitionPlan::default();

    if tier_cfg.recurring {
        open_next_level(mission, tier_cfg, now, &mut plan)?;
        mission.status = MissionStatus::Processing;
    } else {
        match config.next_tier(tier_number) {
            Some(next) => start_tier(mission, next, now, &mut plan)?,
            None => mission.status = MissionStatus::Completed,
        }
    }

    mission.updated_at = now;
    Ok(plan)
}

/// Apply a rejected reward: the tier becomes claimable again
pub fn reject_reward(mission: &mut Mission, now: DateTime<Utc>) -> MissionResult<TransitionPlan> {
    require_pending_claim(mission)?.status = TierStatus::AwaitingReward;
    mission.status = MissionStatus::Processing;
    mission.updated_at = now;

    let mut plan = TransitionPlan::default();
    rearm_reward(mission, now, &mut plan);
    Ok(plan)
}

/// Undo `begin_claim` after the reward gateway refused the claim
pub fn rollback_claim(mission: &mut Mission, now: DateTime<Utc>) -> MissionResult<TransitionPlan> {
    reject_reward(mission, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (MissionConfig, Mission, DateTime<Utc>) {
        let config = MissionConfig::sample();
        let now = Utc::now();
        let (mission, _) = create_mission("U1", "0800000000", &config, now).unwrap();
        (config, mission, now)
    }

    fn event_types(plan: &TransitionPlan) -> Vec<EventType> {
        plan.events.iter().map(|e| e.event_type).collect()
    }

    /// Drive a mission to the recurring tier with level 1 open
    fn at_recurring_tier(config: &MissionConfig, now: DateTime<Utc>) -> Mission {
        let (mut mission, _) = create_mission("U1", "0800000000", config, now).unwrap();
        let mut plan = TransitionPlan::default();
        mission.tiers[0].status = TierStatus::Completed;
        start_tier(&mut mission, config.tier(2).unwrap(), now, &mut plan).unwrap();
        mission.tiers[1].status = TierStatus::Completed;
        start_tier(&mut mission, config.tier(3).unwrap(), now, &mut plan).unwrap();
        mission
    }

    #[test]
    fn test_create_mission_schedules_first_level() {
        let config = MissionConfig::sample();
        let now = Utc::now();
        let (mission, plan) = create_mission("U1", "0800000000", &config, now).unwrap();

        assert_eq!(mission.tiers.len(), 1);
        assert_eq!(
            event_types(&plan),
            vec![EventType::LevelExpiration, EventType::FollowUp]
        );
        let expiry = &plan.events[0];
        assert_eq!(expiry.expire_time, now + Duration::hours(24) + Duration::minutes(5));
        assert_eq!(plan.events[1].expire_time, now + Duration::hours(12));
    }

    #[test]
    fn test_create_mission_without_tiers() {
        let err = create_mission("U1", "080", &MissionConfig::new(vec![]), Utc::now()).unwrap_err();
        assert!(matches!(err, MissionError::Configuration(_)));
    }

    #[test]
    fn test_activity_equal_to_target_succeeds() {
        let (config, mut mission, now) = setup();
        let (outcome, plan) = resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();

        assert_eq!(outcome, LevelOutcome::Advanced);
        let tier = mission.current().unwrap();
        assert_eq!(tier.levels[0].status, LevelStatus::Success);
        assert_eq!(tier.levels[0].current_bet, 1000.0);
        assert_eq!(tier.current_level, 2);
        assert_eq!(tier.status, TierStatus::Processing);
        assert_eq!(
            event_types(&plan),
            vec![EventType::LevelExpiration, EventType::FollowUp]
        );
        assert!(plan.events.iter().all(|e| e.level == 2));
        assert_eq!(plan.cancellations, vec![EventFilter::level(1, 1)]);
        assert_eq!(plan.notices[0].kind, MessageKind::MissionSuccess);
    }

    #[test]
    fn test_just_below_target_fails_standard_tier() {
        let (config, mut mission, now) = setup();
        let (outcome, plan) = resolve_open_level(&mut mission, &config, 1, 999.99, now).unwrap();

        assert_eq!(outcome, LevelOutcome::MissionFailed);
        assert_eq!(mission.status, MissionStatus::Failed);
        assert!(plan.events.is_empty());
        assert_eq!(plan.notices[0].kind, MessageKind::MissionFailed);
        assert_eq!(plan.notices[0].placeholders["target"], "1000");
    }

    #[test]
    fn test_second_level_failure_fails_mission() {
        let (config, mut mission, now) = setup();
        resolve_open_level(&mut mission, &config, 1, 1500.0, now).unwrap();

        let later = now + Duration::hours(24);
        let (outcome, plan) = resolve_open_level(&mut mission, &config, 1, 500.0, later).unwrap();

        assert_eq!(outcome, LevelOutcome::MissionFailed);
        let tier = mission.current().unwrap();
        assert_eq!(tier.levels[1].status, LevelStatus::Failed);
        assert_eq!(tier.status, TierStatus::Failed);
        assert_eq!(mission.status, MissionStatus::Failed);
        assert!(plan.events.is_empty());
    }

    #[test]
    fn test_final_level_success_schedules_single_reminder() {
        let (config, mut mission, now) = setup();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        let (outcome, plan) = resolve_open_level(&mut mission, &config, 1, 2000.0, now).unwrap();

        assert_eq!(outcome, LevelOutcome::TierCompleted);
        let tier = mission.current().unwrap();
        assert_eq!(tier.status, TierStatus::AwaitingReward);
        assert_eq!(tier.expire_reward, Some(now + Duration::hours(72)));
        assert_eq!(
            event_types(&plan),
            vec![EventType::RewardExpiration, EventType::RewardNotification]
        );
        assert_eq!(plan.events[1].expire_time, now + Duration::hours(48));
        assert_eq!(plan.notices[0].placeholders["expireRewardDays"], "3");
    }

    #[test]
    fn test_recurring_tier_failure_budget() {
        let config = MissionConfig::sample();
        let now = Utc::now();
        let mut mission = at_recurring_tier(&config, now);

        let (outcome, _) = resolve_open_level(&mut mission, &config, 3, 0.0, now).unwrap();
        assert_eq!(outcome, LevelOutcome::Retried { consecutive_fails: 1 });

        let (outcome, plan) = resolve_open_level(&mut mission, &config, 3, 0.0, now).unwrap();
        assert_eq!(outcome, LevelOutcome::Retried { consecutive_fails: 2 });
        assert_eq!(mission.status, MissionStatus::Processing);
        assert_eq!(mission.current().unwrap().status, TierStatus::Processing);
        assert_eq!(mission.current().unwrap().open_level().unwrap().number, 3);
        assert_eq!(event_types(&plan)[0], EventType::LevelExpiration);

        let (outcome, plan) = resolve_open_level(&mut mission, &config, 3, 0.0, now).unwrap();
        assert_eq!(outcome, LevelOutcome::MissionFailed);
        assert_eq!(mission.status, MissionStatus::Failed);
        assert_eq!(mission.consecutive_fails, 3);
        assert!(plan.events.is_empty());
    }

    #[test]
    fn test_recurring_success_resets_counter() {
        let config = MissionConfig::sample();
        let now = Utc::now();
        let mut mission = at_recurring_tier(&config, now);

        resolve_open_level(&mut mission, &config, 3, 0.0, now).unwrap();
        resolve_open_level(&mut mission, &config, 3, 0.0, now).unwrap();
        assert_eq!(mission.consecutive_fails, 2);

        // level 3 is the configured final level of the recurring tier
        let (outcome, plan) = resolve_open_level(&mut mission, &config, 3, 10_000.0, now).unwrap();
        assert_eq!(outcome, LevelOutcome::TierCompleted);
        assert_eq!(mission.consecutive_fails, 0);

        let reminders: Vec<_> = plan
            .events
            .iter()
            .filter(|e| e.event_type == EventType::RecurringRewardNotification)
            .collect();
        // 72h deadline, 24h interval: reminders at +24h and +48h
        assert_eq!(reminders.len(), 2);
        assert_eq!(reminders[0].expire_time, now + Duration::hours(24));
        assert_eq!(reminders[1].expire_time, now + Duration::hours(48));
    }

    #[test]
    fn test_resolution_requires_open_level_and_processing() {
        let (config, mut mission, now) = setup();
        assert!(resolve_open_level(&mut mission, &config, 2, 0.0, now).is_err());

        mission.status = MissionStatus::Pending;
        assert!(resolve_open_level(&mut mission, &config, 1, 0.0, now).is_err());
    }

    #[test]
    fn test_reward_expiry_starts_next_tier() {
        let (config, mut mission, now) = setup();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();

        let early = expire_reward(&mut mission, &config, 1, now + Duration::hours(1)).unwrap();
        assert!(early.is_none());

        let plan = expire_reward(&mut mission, &config, 1, now + Duration::hours(72))
            .unwrap()
            .unwrap();
        assert_eq!(mission.tiers[0].status, TierStatus::ExpireReward);
        assert_eq!(mission.current_tier, 2);
        assert_eq!(mission.tiers.len(), 2);
        assert_eq!(mission.status, MissionStatus::Processing);
        assert!(plan.events.iter().all(|e| e.tier == 2));
        assert_eq!(plan.cancellations, vec![EventFilter::reward()]);
    }

    #[test]
    fn test_reward_expiry_on_last_tier_fails_mission() {
        let config = MissionConfig::sample();
        let now = Utc::now();
        let mut mission = at_recurring_tier(&config, now);
        let tier = mission.current_mut().unwrap();
        tier.status = TierStatus::AwaitingReward;
        tier.expire_reward = Some(now);

        expire_reward(&mut mission, &config, 3, now).unwrap().unwrap();
        assert_eq!(mission.status, MissionStatus::Failed);
        assert_eq!(mission.current().unwrap().status, TierStatus::ExpireReward);
    }

    #[test]
    fn test_reward_expiry_is_stale_after_claim() {
        let (config, mut mission, now) = setup();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        begin_claim(&mut mission, 7, now).unwrap();

        let result = expire_reward(&mut mission, &config, 1, now + Duration::days(10)).unwrap();
        assert!(result.is_none());
        assert_eq!(mission.status, MissionStatus::Pending);
    }

    #[test]
    fn test_claim_while_processing_is_rejected() {
        let (_, mut mission, now) = setup();
        let before = mission.clone();
        let err = begin_claim(&mut mission, 7, now).unwrap_err();
        assert!(matches!(err, MissionError::NotEligible(_)));
        assert_eq!(mission, before);
    }

    #[test]
    fn test_claim_then_approve_advances_tier() {
        let (config, mut mission, now) = setup();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();

        let (log, plan) = begin_claim(&mut mission, 7, now).unwrap();
        assert_eq!(log.status, ClaimStatus::Pending);
        assert_eq!(log.reward, 100);
        assert_eq!((log.tier, log.level), (1, 2));
        assert_eq!(mission.status, MissionStatus::Pending);
        assert_eq!(mission.current().unwrap().status, TierStatus::Pending);
        assert_eq!(plan.cancellations, vec![EventFilter::reward()]);
        assert_eq!(plan.notices[0].kind, MessageKind::GetReward);

        let plan = approve_reward(&mut mission, &config, now).unwrap();
        assert_eq!(mission.tiers[0].status, TierStatus::Completed);
        assert_eq!(mission.current_tier, 2);
        assert_eq!(mission.status, MissionStatus::Processing);
        assert_eq!(mission.current().unwrap().status, TierStatus::Processing);
        assert_eq!(plan.events.len(), 2);
    }

    #[test]
    fn test_approve_on_last_standard_tier_completes() {
        let mut config = MissionConfig::sample();
        config.tiers.truncate(1);
        let now = Utc::now();
        let (mut mission, _) = create_mission("U1", "080", &config, now).unwrap();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        begin_claim(&mut mission, 7, now).unwrap();

        let plan = approve_reward(&mut mission, &config, now).unwrap();
        assert_eq!(mission.status, MissionStatus::Completed);
        assert!(plan.events.is_empty());
    }

    #[test]
    fn test_approve_on_recurring_tier_opens_next_level() {
        let config = MissionConfig::sample();
        let now = Utc::now();
        let mut mission = at_recurring_tier(&config, now);
        for _ in 0..3 {
            resolve_open_level(&mut mission, &config, 3, 10_000.0, now).unwrap();
        }
        assert_eq!(mission.current().unwrap().status, TierStatus::AwaitingReward);
        begin_claim(&mut mission, 7, now).unwrap();

        approve_reward(&mut mission, &config, now).unwrap();
        let tier = mission.current().unwrap();
        assert_eq!(tier.status, TierStatus::Processing);
        assert_eq!(tier.open_level().unwrap().number, 4);
        assert_eq!(mission.status, MissionStatus::Processing);
    }

    #[test]
    fn test_reject_reopens_claim_and_rearms_deadline() {
        let (config, mut mission, now) = setup();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        resolve_open_level(&mut mission, &config, 1, 1000.0, now).unwrap();
        begin_claim(&mut mission, 7, now).unwrap();

        let plan = reject_reward(&mut mission, now).unwrap();
        assert_eq!(mission.status, MissionStatus::Processing);
        assert_eq!(mission.current().unwrap().status, TierStatus::AwaitingReward);
        assert_eq!(event_types(&plan), vec![EventType::RewardExpiration]);
        assert_eq!(plan.events[0].expire_time, now + Duration::hours(72));

        // claimable again
        assert!(begin_claim(&mut mission, 7, now).is_ok());
    }

    #[test]
    fn test_decision_without_claim_is_rejected() {
        let (config, mut mission, now) = setup();
        assert!(approve_reward(&mut mission, &config, now).is_err());
        assert!(reject_reward(&mut mission, now).is_err());
    }
}
