//! Mission Engine Builder

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::dispatch::{HttpDispatcher, NotificationDispatcher, RecordingDispatcher};
use crate::error::{MissionError, MissionResult};
use crate::oracle::{BetOracle, HttpBetOracle};
use crate::reward::{HttpRewardGateway, RewardGateway};
use crate::storage::MissionStorage;

use super::MissionEngine;

/// Mission Engine Builder
///
/// Collaborators that are not supplied are created from the service
/// configuration. Without LINE or Telegram credentials notices are only
/// logged.
pub struct MissionEngineBuilder {
    config: Option<ServiceConfig>,
    storage: Option<Arc<dyn MissionStorage>>,
    oracle: Option<Arc<dyn BetOracle>>,
    dispatcher: Option<Arc<dyn NotificationDispatcher>>,
    gateway: Option<Arc<dyn RewardGateway>>,
}

impl MissionEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            storage: None,
            oracle: None,
            dispatcher: None,
            gateway: None,
        }
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn MissionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn BetOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn RewardGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Build the engine
    pub fn build(self) -> MissionResult<MissionEngine> {
        let config = self.config.unwrap_or_default();
        let storage = self
            .storage
            .ok_or_else(|| MissionError::Configuration("Storage is required".to_string()))?;

        let oracle: Arc<dyn BetOracle> = match self.oracle {
            Some(oracle) => oracle,
            None => Arc::new(HttpBetOracle::new(config.provider.clone())?),
        };

        let dispatcher: Arc<dyn NotificationDispatcher> = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None if config.notifier.is_configured() => {
                Arc::new(HttpDispatcher::new(config.notifier.clone())?)
            }
            None => Arc::new(RecordingDispatcher::new()),
        };

        let gateway: Arc<dyn RewardGateway> = match self.gateway {
            Some(gateway) => gateway,
            None => Arc::new(HttpRewardGateway::new(config.provider.clone())?),
        };

        Ok(MissionEngine {
            storage,
            oracle,
            dispatcher,
            gateway,
            config,
        })
    }
}

impl Default for MissionEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_builder_requires_storage() {
        let result = MissionEngineBuilder::new()
            .config(ServiceConfig::development())
            .build();
        assert!(matches!(result, Err(MissionError::Configuration(_))));
    }

    #[test]
    fn test_builder_defaults_collaborators() {
        let engine = MissionEngineBuilder::new()
            .storage(Arc::new(MemoryStorage::new()))
            .build()
            .unwrap();
        assert_eq!(engine.config().engine.max_event_attempts, 5);
    }
}
