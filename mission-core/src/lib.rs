//! Mission Core - Wager Mission Progression Engine
//!
//! This crate drives per-user wager missions through tiers of timed levels,
//! schedules the expiration events that advance them and handles reward
//! claims.
//!
//! # Architecture
//!
//! - **Types**: missions, tiers, levels, expiration events, claim logs and the
//!   tier configuration
//! - **Transition**: pure advancement rules shared by the scheduler and the API
//! - **Storage**: `MissionStorage` trait with in-memory and sled backends
//! - **Engine**: `MissionEngine` plus the background `EventProcessor`
//! - **Collaborators**: bet oracle, notification dispatcher and reward gateway
//!
//! # Mission lifecycle
//!
//! ```text
//! processing ──claim──> pending ──approve──> processing (next tier/level)
//!     │                    │   └──approve──> completed (last tier)
//!     │                    └──reject───> processing (claimable again)
//!     └──target missed / reward lapsed on last tier──> failed
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mission_core::{EventProcessor, MemoryStorage, MissionEngine, ServiceConfig};
//!
//! async fn example() {
//!     let engine = MissionEngine::builder()
//!         .config(ServiceConfig::development())
//!         .storage(Arc::new(MemoryStorage::new()))
//!         .build()
//!         .unwrap();
//!     let engine = Arc::new(engine);
//!
//!     let processor = EventProcessor::new(engine.clone()).start();
//!     let mission = engine.create_mission("U123", "0800000000").await.unwrap();
//!     println!("mission {} started", mission.id);
//!     processor.stop().await;
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod reward;
pub mod storage;
pub mod transition;
pub mod types;

pub use config::{EngineConfig, NotifierConfig, ProviderConfig, ServiceConfig};
pub use dispatch::{flex_bubble, HttpDispatcher, NotificationDispatcher, RecordingDispatcher};
pub use engine::{
    CallbackOutcome, ClaimReceipt, EventDisposition, EventProcessor, MissionEngine,
    MissionEngineBuilder, ProcessorHandle,
};
pub use error::{MissionError, MissionResult};
pub use oracle::{BetOracle, FixedBetOracle, HttpBetOracle};
pub use reward::{ClaimSubmission, HttpRewardGateway, MemoryRewardGateway, RewardGateway};
pub use storage::{
    open_storage, MemoryStorage, MissionStorage, SledStorage, StorageConfig, StorageStats,
};
pub use transition::{LevelOutcome, TransitionPlan};
pub use types::*;
