//! Mission API Server
//!
//! Provides REST APIs for wager missions, reward claims and the tier
//! configuration.
//!
//! ## Endpoints
//!
//! ### Health
//! - GET /health - Liveness with queue counters
//! - GET /ready - Storage and configuration readiness
//!
//! ### Missions
//! - POST /api/missions - Create mission
//! - GET /api/missions/check?user_id= - Whether the user has an active mission
//! - GET /api/missions/processing?user_id= - Latest mission of the user
//! - GET /api/missions/:mission_id - Get mission
//! - PUT /api/missions/:mission_id/status - Resolve the open level of a tier now
//! - GET /api/missions/:mission_id/events - Scheduled events
//!
//! ### Rewards
//! - POST /api/missions/:mission_id/claim-reward - Claim the current tier's reward
//! - POST /api/missions/reward-callback - Reward system decision
//!
//! ### Configuration
//! - GET /api/config - Active tier configuration
//! - POST /api/config - Replace configuration
//! - PUT /api/config/tiers - Replace tiers
//! - PUT /api/config/messages - Replace message templates
//!
//! ### Activity
//! - GET /api/activity?user_id=&start_date=&end_date= - Wager total for a window
//! - GET /api/messages?user_id=&limit= - Messages sent to a user, newest first

pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use dto::*;
pub use error::*;
pub use routes::*;
pub use server::*;
pub use state::*;
