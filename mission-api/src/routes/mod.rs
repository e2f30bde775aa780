//! API route handlers

pub mod activity;
pub mod config;
pub mod health;
pub mod mission;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // Mission endpoints
        .route("/api/missions", post(mission::create_mission))
        .route("/api/missions/check", get(mission::check_mission))
        .route("/api/missions/processing", get(mission::processing_mission))
        .route("/api/missions/reward-callback", post(mission::reward_callback))
        .route("/api/missions/:mission_id", get(mission::get_mission))
        .route("/api/missions/:mission_id/status", put(mission::update_status))
        .route("/api/missions/:mission_id/claim-reward", post(mission::claim_reward))
        .route("/api/missions/:mission_id/events", get(mission::mission_events))
        // Configuration endpoints
        .route("/api/config", get(config::get_config).post(config::save_config))
        .route("/api/config/tiers", put(config::update_tiers))
        .route("/api/config/messages", put(config::update_messages))
        // Activity endpoints
        .route("/api/activity", get(activity::get_activity))
        .route("/api/messages", get(activity::get_messages))
        // State
        .with_state(state)
}
