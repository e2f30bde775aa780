//! Mission state
//!
//! A mission is the per-user progress record. Tiers and levels are append-only
//! lists addressed by their stable 1-based numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::MissionId;
use super::tier_config::TierConfig;

/// Mission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Levels are being played
    Processing,
    /// A reward claim awaits the external decision
    Pending,
    /// Every tier paid out (terminal)
    Completed,
    /// Target missed or reward lapsed on the last tier (terminal)
    Failed,
}

impl MissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Failed)
    }
}

/// Tier status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierStatus {
    Processing,
    Completed,
    AwaitingReward,
    /// Reward claim submitted
    Pending,
    Failed,
    /// Reward deadline passed without a claim
    ExpireReward,
}

/// Level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    Processing,
    Success,
    Failed,
}

/// A bounded window in which activity is measured against the tier target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub number: u32,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub expire_date: DateTime<Utc>,
    pub follow_up_date: DateTime<Utc>,
    pub status: LevelStatus,
    /// Activity measured when the level resolved
    pub current_bet: f64,
}

impl Level {
    /// Open a level window starting at `now`
    pub fn open(number: u32, config: &TierConfig, now: DateTime<Utc>) -> Self {
        Self {
            number,
            name: format!("level {}", number),
            start_date: now,
            expire_date: now + config.period(),
            follow_up_date: now + config.follow_up_offset(),
            status: LevelStatus::Processing,
            current_bet: 0.0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == LevelStatus::Processing
    }
}

/// One tier instance inside a mission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub number: u32,
    pub name: String,
    pub reward: u64,
    pub target: u64,
    pub status: TierStatus,
    pub current_level: u32,
    pub max_level: u32,
    pub levels: Vec<Level>,
    /// Reward claim deadline, set when the tier completes
    #[serde(default)]
    pub expire_reward: Option<DateTime<Utc>>,
}

impl Tier {
    /// Start a tier from its configuration with level 1 open
    pub fn start(config: &TierConfig, now: DateTime<Utc>) -> Self {
        Self {
            number: config.tier,
            name: config.name.clone(),
            reward: config.reward,
            target: config.target,
            status: TierStatus::Processing,
            current_level: 1,
            max_level: config.max_level,
            levels: vec![Level::open(1, config, now)],
            expire_reward: None,
        }
    }

    /// The level currently being played, if any
    pub fn open_level(&self) -> Option<&Level> {
        self.levels.iter().rev().find(|l| l.is_open())
    }

    pub fn open_level_mut(&mut self) -> Option<&mut Level> {
        self.levels.iter_mut().rev().find(|l| l.is_open())
    }

    pub fn level(&self, number: u32) -> Option<&Level> {
        self.levels.iter().find(|l| l.number == number)
    }

    /// Append the next level and make it current
    pub fn push_level(&mut self, config: &TierConfig, now: DateTime<Utc>) -> &Level {
        let number = self.levels.iter().map(|l| l.number).max().unwrap_or(0) + 1;
        self.current_level = number;
        self.levels.push(Level::open(number, config, now));
        &self.levels[self.levels.len() - 1]
    }

    /// Whether a reward can be claimed for this tier
    pub fn is_claimable(&self) -> bool {
        matches!(self.status, TierStatus::Completed | TierStatus::AwaitingReward)
    }

    /// Wager total over every resolved level
    pub fn total_bet(&self) -> f64 {
        self.levels.iter().map(|l| l.current_bet).sum()
    }
}

/// A user's progress through the configured tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub user_id: String,
    pub phone_number: String,
    pub status: MissionStatus,
    /// 1-based number of the tier being played
    pub current_tier: u32,
    pub tiers: Vec<Tier>,
    /// Back-to-back failures on the recurring tier
    #[serde(default)]
    pub consecutive_fails: u32,
    /// Optimistic concurrency counter
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    /// Create a mission at tier 1 with its first level open
    pub fn new(
        user_id: impl Into<String>,
        phone_number: impl Into<String>,
        first_tier: &TierConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MissionId::generate(),
            user_id: user_id.into(),
            phone_number: phone_number.into(),
            status: MissionStatus::Processing,
            current_tier: first_tier.tier,
            tiers: vec![Tier::start(first_tier, now)],
            consecutive_fails: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tier(&self, number: u32) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.number == number)
    }

    pub fn tier_mut(&mut self, number: u32) -> Option<&mut Tier> {
        self.tiers.iter_mut().find(|t| t.number == number)
    }

    pub fn current(&self) -> Option<&Tier> {
        self.tier(self.current_tier)
    }

    pub fn current_mut(&mut self) -> Option<&mut Tier> {
        let number = self.current_tier;
        self.tier_mut(number)
    }

    /// Processing or waiting on a reward decision
    pub fn is_active(&self) -> bool {
        matches!(self.status, MissionStatus::Processing | MissionStatus::Pending)
    }
}
