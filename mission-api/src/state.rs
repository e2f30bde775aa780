//! Application state for the API server

use mission_core::MissionEngine;
use std::env;
use std::sync::Arc;

/// API server state
#[derive(Clone)]
pub struct AppState {
    /// Shared mission engine
    pub engine: Arc<MissionEngine>,
    /// API version
    pub version: String,
}

impl AppState {
    pub fn new(engine: Arc<MissionEngine>) -> Self {
        Self {
            engine,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Base URL under which the reward system reaches this server
    pub public_base_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
            public_base_url: None,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - MISSION_API_HOST
    /// - MISSION_API_PORT
    /// - MISSION_API_CORS
    /// - MISSION_PUBLIC_BASE_URL
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("MISSION_API_HOST").unwrap_or(defaults.host),
            port: env::var("MISSION_API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            enable_cors: env::var("MISSION_API_CORS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enable_cors),
            public_base_url: env::var("MISSION_PUBLIC_BASE_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert!(config.enable_cors);
        assert!(config.public_base_url.is_none());
    }
}
