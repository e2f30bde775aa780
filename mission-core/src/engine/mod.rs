//! Mission Engine
//!
//! Ties storage, the transition rules and the external collaborators
//! together. The event processor and the HTTP API share one engine.
//!
//! # Write order
//!
//! Every state change follows the same order:
//!
//! 1. the mission is written with an optimistic version check
//! 2. pending events selected by the plan are cancelled
//! 3. new events are enqueued
//! 4. notices are sent
//!
//! Steps 2 to 4 run after the mission write succeeded. Their failures are
//! logged and do not undo the mission write.

mod builder;
mod handlers;
mod missions;
mod rewards;
mod runner;

pub use builder::MissionEngineBuilder;
pub use handlers::EventDisposition;
pub use rewards::{CallbackOutcome, ClaimReceipt};
pub use runner::{EventProcessor, ProcessorHandle};

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::dispatch::NotificationDispatcher;
use crate::error::{MissionError, MissionResult};
use crate::oracle::BetOracle;
use crate::reward::RewardGateway;
use crate::storage::{MissionStorage, StorageStats};
use crate::transition::TransitionPlan;
use crate::types::{MessageLog, MessageTemplates, Mission, MissionConfig, Notice, TierConfig};

/// Mission engine
pub struct MissionEngine {
    storage: Arc<dyn MissionStorage>,
    oracle: Arc<dyn BetOracle>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    gateway: Arc<dyn RewardGateway>,
    config: ServiceConfig,
}

impl MissionEngine {
    pub fn builder() -> MissionEngineBuilder {
        MissionEngineBuilder::new()
    }

    pub fn storage(&self) -> &Arc<dyn MissionStorage> {
        &self.storage
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ==================== Tier configuration ====================

    /// Active tier configuration, or a configuration error when none is stored
    pub async fn mission_config(&self) -> MissionResult<MissionConfig> {
        self.storage
            .load_config()
            .await?
            .ok_or_else(|| MissionError::Configuration("No tier configuration found".to_string()))
    }

    pub async fn get_config(&self) -> MissionResult<Option<MissionConfig>> {
        self.storage.load_config().await
    }

    /// Validate and replace the active configuration
    pub async fn save_config(&self, mut config: MissionConfig) -> MissionResult<MissionConfig> {
        config
            .validate()
            .map_err(|e| MissionError::InvalidInput(e.to_string()))?;
        config.updated_at = Some(Utc::now());
        self.storage.save_config(&config).await?;
        info!("Saved tier configuration with {} tiers", config.tiers.len());
        Ok(config)
    }

    /// Replace only the tier list, keeping the stored message templates
    pub async fn update_tiers(&self, tiers: Vec<TierConfig>) -> MissionResult<MissionConfig> {
        let mut config = self
            .storage
            .load_config()
            .await?
            .unwrap_or_else(|| MissionConfig::new(Vec::new()));
        config.tiers = tiers;
        self.save_config(config).await
    }

    /// Replace only the message templates of the stored configuration
    pub async fn update_messages(&self, messages: MessageTemplates) -> MissionResult<MissionConfig> {
        let mut config = self
            .storage
            .load_config()
            .await?
            .ok_or_else(|| MissionError::NotFound("tier configuration".to_string()))?;
        config.messages = messages;
        self.save_config(config).await
    }

    /// Messages sent to a user, newest first
    pub async fn message_logs(&self, user_id: &str, limit: usize) -> MissionResult<Vec<MessageLog>> {
        if user_id.trim().is_empty() {
            return Err(MissionError::InvalidInput("User ID is required".to_string()));
        }
        self.storage.list_message_logs(user_id, limit).await
    }

    pub async fn stats(&self) -> MissionResult<StorageStats> {
        self.storage.get_stats().await
    }

    // ==================== Internals ====================

    /// Bound an external call by the configured timeout
    async fn bounded<T, F>(&self, what: &str, call: F) -> MissionResult<T>
    where
        F: Future<Output = MissionResult<T>>,
    {
        let limit = self.config.engine.external_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(MissionError::Timeout(
                self.config.engine.external_timeout_secs,
                what.to_string(),
            )),
        }
    }

    /// Activity of a user over a window; a failed lookup counts as zero
    async fn measure_activity(&self, user_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        match self
            .bounded("bet oracle", self.oracle.get_activity(user_id, start, end))
            .await
        {
            Ok(amount) => amount,
            Err(e) => {
                warn!("Bet lookup for user {} failed, using 0: {}", user_id, e);
                0.0
            }
        }
    }

    /// Write the mission, then carry out the plan
    async fn commit(
        &self,
        mission: &Mission,
        plan: TransitionPlan,
        templates: &MessageTemplates,
    ) -> MissionResult<Mission> {
        let stored = self.storage.update_mission(mission).await?;
        self.apply_plan(&stored, plan, templates).await;
        Ok(stored)
    }

    async fn apply_plan(&self, mission: &Mission, plan: TransitionPlan, templates: &MessageTemplates) {
        for filter in &plan.cancellations {
            match self.storage.cancel_events(&mission.id, filter).await {
                Ok(0) => {}
                Ok(n) => debug!("Cancelled {} pending events of mission {}", n, mission.id),
                Err(e) => error!("Failed to cancel events of mission {}: {}", mission.id, e),
            }
        }

        for event in &plan.events {
            if let Err(e) = self.storage.insert_event(event).await {
                error!(
                    "Failed to enqueue {} event for mission {} tier {} level {}: {}",
                    event.event_type, mission.id, event.tier, event.level, e
                );
            }
        }

        for notice in &plan.notices {
            self.notify(notice, templates).await;
        }
    }

    /// Send a notice to its user and record the attempt in the message log
    async fn notify(&self, notice: &Notice, templates: &MessageTemplates) {
        let message = notice.render(templates);
        let failure = match self.bounded("notification", self.dispatcher.send(&message)).await {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    "Failed to send {:?} notice for mission {} to {}: {}",
                    notice.kind, notice.mission_id, notice.user_id, e
                );
                Some(e.to_string())
            }
        };

        let log = MessageLog::record(notice, &message, failure, Utc::now());
        if let Err(e) = self.storage.insert_message_log(&log).await {
            error!(
                "Failed to log {:?} notice for mission {}: {}",
                notice.kind, notice.mission_id, e
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::dispatch::RecordingDispatcher;
    use crate::oracle::FixedBetOracle;
    use crate::reward::MemoryRewardGateway;
    use crate::storage::MemoryStorage;

    pub struct Harness {
        pub engine: Arc<MissionEngine>,
        pub storage: Arc<MemoryStorage>,
        pub oracle: Arc<FixedBetOracle>,
        pub dispatcher: Arc<RecordingDispatcher>,
        pub gateway: Arc<MemoryRewardGateway>,
    }

    pub async fn harness() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        storage.save_config(&MissionConfig::sample()).await.unwrap();
        let oracle = Arc::new(FixedBetOracle::new(0.0));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let gateway = Arc::new(MemoryRewardGateway::new());

        let engine = MissionEngine::builder()
            .config(ServiceConfig::development())
            .storage(storage.clone())
            .oracle(oracle.clone())
            .dispatcher(dispatcher.clone())
            .gateway(gateway.clone())
            .build()
            .unwrap();

        Harness {
            engine: Arc::new(engine),
            storage,
            oracle,
            dispatcher,
            gateway,
        }
    }
}
