//! Mission engine data model

pub mod claim;
pub mod common;
pub mod event;
pub mod message_log;
pub mod mission;
pub mod notice;
pub mod tier_config;

pub use claim::*;
pub use common::*;
pub use event::*;
pub use message_log::*;
pub use mission::*;
pub use notice::*;
pub use tier_config::*;
