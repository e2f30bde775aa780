//! Tier configuration
//!
//! Operator-edited parameters for each tier and the user message templates.
//! One active record per deployment, read-only while missions run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MissionError, MissionResult};

/// Longest duration accepted for any hour-based setting (ten years)
pub const MAX_CONFIG_HOURS: u64 = 87_600;

pub(crate) fn hours(h: u64) -> Duration {
    Duration::hours(h.min(MAX_CONFIG_HOURS) as i64)
}

/// Parameters for one tier, keyed by its stable tier number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// 1-based tier number
    pub tier: u32,
    pub name: String,
    /// Length of one level window
    pub period_hours: u64,
    /// Wager total a level must reach
    pub target: u64,
    pub reward: u64,
    pub max_level: u32,
    /// Offset of the reminder inside a level window
    #[serde(default)]
    pub follow_up_hours: u64,
    /// Time allowed to claim the reward once the tier is complete
    pub expire_reward_hours: u64,
    /// Recurring tier only
    #[serde(default)]
    pub max_consecutive_fails: u32,
    /// Lead time of the single reward reminder (standard tiers)
    #[serde(default)]
    pub notify_before_expire_hours: u64,
    /// Spacing of reward reminders (recurring tier)
    #[serde(default)]
    pub notify_interval_hours: u64,
    /// Grace period between level expiry and its evaluation
    #[serde(default)]
    pub processing_delay_minutes: u64,
    /// Retry-on-failure semantics with a consecutive failure budget
    #[serde(default)]
    pub recurring: bool,
}

impl TierConfig {
    pub fn period(&self) -> Duration {
        hours(self.period_hours)
    }

    pub fn follow_up_offset(&self) -> Duration {
        hours(self.follow_up_hours)
    }

    pub fn expire_reward_after(&self) -> Duration {
        hours(self.expire_reward_hours)
    }

    pub fn notify_before_expire(&self) -> Duration {
        hours(self.notify_before_expire_hours)
    }

    pub fn notify_interval(&self) -> Duration {
        hours(self.notify_interval_hours)
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::minutes(self.processing_delay_minutes.min(MAX_CONFIG_HOURS * 60) as i64)
    }

    fn validate(&self) -> MissionResult<()> {
        let invalid = |msg: &str| {
            Err(MissionError::Configuration(format!("tier {}: {}", self.tier, msg)))
        };

        if self.max_level == 0 {
            return invalid("max_level must be at least 1");
        }
        if self.period_hours == 0 {
            return invalid("period_hours must be at least 1");
        }
        let hour_fields = [
            self.period_hours,
            self.follow_up_hours,
            self.expire_reward_hours,
            self.notify_before_expire_hours,
            self.notify_interval_hours,
        ];
        if hour_fields.iter().any(|h| *h > MAX_CONFIG_HOURS) {
            return invalid("hour settings must not exceed ten years");
        }
        if self.recurring && self.max_consecutive_fails == 0 {
            return invalid("a recurring tier needs max_consecutive_fails of at least 1");
        }
        Ok(())
    }
}

/// One user message template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_url: Option<String>,
    #[serde(default)]
    pub image_url: String,
}

impl MessageTemplate {
    fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }
}

/// Templates for every user message the engine sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplates {
    pub followup: MessageTemplate,
    pub mission_success: MessageTemplate,
    pub mission_failed: MessageTemplate,
    pub mission_complete: MessageTemplate,
    pub get_reward: MessageTemplate,
    pub reward_notification: MessageTemplate,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            followup: MessageTemplate::new(
                "Keep going!",
                "You have wagered {currentBet} of {target} for this level.",
            ),
            mission_success: MessageTemplate::new(
                "Level complete",
                "You reached the target. The next level has started.",
            ),
            mission_failed: MessageTemplate::new(
                "Mission failed",
                "The level ended before reaching {target}.",
            ),
            mission_complete: MessageTemplate::new(
                "Tier complete",
                "Claim your reward within {expireRewardDays} days.",
            ),
            get_reward: MessageTemplate::new(
                "Reward requested",
                "Your reward claim is being reviewed.",
            ),
            reward_notification: MessageTemplate::new(
                "Reward waiting",
                "Your reward expires in {remainingDays} days.",
            ),
        }
    }
}

/// Active mission configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionConfig {
    pub tiers: Vec<TierConfig>,
    #[serde(default)]
    pub messages: MessageTemplates,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MissionConfig {
    pub fn new(tiers: Vec<TierConfig>) -> Self {
        Self {
            tiers,
            messages: MessageTemplates::default(),
            updated_at: None,
        }
    }

    /// Look up a tier by its stable number
    pub fn tier(&self, number: u32) -> Option<&TierConfig> {
        self.tiers.iter().find(|t| t.tier == number)
    }

    pub fn first_tier(&self) -> Option<&TierConfig> {
        self.tier(1)
    }

    /// Tier following `number`, if the configuration has one
    pub fn next_tier(&self, number: u32) -> Option<&TierConfig> {
        self.tier(number + 1)
    }

    /// Check the configuration before it becomes active
    pub fn validate(&self) -> MissionResult<()> {
        if self.tiers.is_empty() {
            return Err(MissionError::Configuration(
                "No tier configuration found".to_string(),
            ));
        }

        for (index, tier) in self.tiers.iter().enumerate() {
            let expected = index as u32 + 1;
            if tier.tier != expected {
                return Err(MissionError::Configuration(format!(
                    "tier numbers must be contiguous from 1: expected {}, found {}",
                    expected, tier.tier
                )));
            }
            tier.validate()?;
            if tier.recurring && index + 1 != self.tiers.len() {
                return Err(MissionError::Configuration(format!(
                    "tier {}: only the last tier may be recurring",
                    tier.tier
                )));
            }
        }

        Ok(())
    }

    /// Three-tier layout used in development and tests
    pub fn sample() -> Self {
        let standard = |tier: u32, target: u64, reward: u64| TierConfig {
            tier,
            name: format!("Tier {}", tier),
            period_hours: 24,
            target,
            reward,
            max_level: 2,
            follow_up_hours: 12,
            expire_reward_hours: 72,
            max_consecutive_fails: 0,
            notify_before_expire_hours: 24,
            notify_interval_hours: 0,
            processing_delay_minutes: 5,
            recurring: false,
        };

        Self::new(vec![
            standard(1, 1_000, 100),
            standard(2, 5_000, 500),
            TierConfig {
                name: "Tier 3".to_string(),
                max_level: 3,
                max_consecutive_fails: 3,
                notify_before_expire_hours: 0,
                notify_interval_hours: 24,
                recurring: true,
                ..standard(3, 10_000, 1_000)
            },
        ])
    }
}
