//! Engine Configuration
//!
//! Runtime settings for the event processor and the external collaborators.
//! Supports loading from environment variables with the MISSION_ prefix.
//!
//! Tier parameters are operational data and live in [`crate::types::MissionConfig`].

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Event processor and transition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sleep between passes when nothing is due (milliseconds)
    #[serde(default = "default_idle_poll")]
    pub idle_poll_interval_ms: u64,
    /// Sleep after handling an event (milliseconds)
    #[serde(default = "default_busy_poll")]
    pub busy_poll_interval_ms: u64,
    /// Attempts before an event is quarantined
    #[serde(default = "default_max_attempts")]
    pub max_event_attempts: u32,
    /// Base retry delay, multiplied by the attempt count
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Upper bound on any single external call
    #[serde(default = "default_external_timeout")]
    pub external_timeout_secs: u64,
    /// UTC offset used when rendering dates for people
    #[serde(default = "default_display_offset")]
    pub display_utc_offset_hours: i32,
}

fn default_idle_poll() -> u64 {
    5_000
}

fn default_busy_poll() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    60
}

fn default_external_timeout() -> u64 {
    5
}

fn default_display_offset() -> i32 {
    7
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval_ms: default_idle_poll(),
            busy_poll_interval_ms: default_busy_poll(),
            max_event_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            external_timeout_secs: default_external_timeout(),
            display_utc_offset_hours: default_display_offset(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - MISSION_IDLE_POLL_MS
    /// - MISSION_BUSY_POLL_MS
    /// - MISSION_MAX_EVENT_ATTEMPTS
    /// - MISSION_RETRY_DELAY_SECS
    /// - MISSION_EXTERNAL_TIMEOUT_SECS
    /// - MISSION_DISPLAY_UTC_OFFSET
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            idle_poll_interval_ms: env_parse("MISSION_IDLE_POLL_MS")
                .unwrap_or(defaults.idle_poll_interval_ms),
            busy_poll_interval_ms: env_parse("MISSION_BUSY_POLL_MS")
                .unwrap_or(defaults.busy_poll_interval_ms),
            max_event_attempts: env_parse("MISSION_MAX_EVENT_ATTEMPTS")
                .unwrap_or(defaults.max_event_attempts),
            retry_delay_secs: env_parse("MISSION_RETRY_DELAY_SECS")
                .unwrap_or(defaults.retry_delay_secs),
            external_timeout_secs: env_parse("MISSION_EXTERNAL_TIMEOUT_SECS")
                .unwrap_or(defaults.external_timeout_secs),
            display_utc_offset_hours: env_parse("MISSION_DISPLAY_UTC_OFFSET")
                .unwrap_or(defaults.display_utc_offset_hours),
        }
    }

    /// Fast polling and short retries for local runs
    pub fn development() -> Self {
        Self {
            idle_poll_interval_ms: 1_000,
            busy_poll_interval_ms: 50,
            max_event_attempts: 3,
            retry_delay_secs: 5,
            external_timeout_secs: 2,
            display_utc_offset_hours: 7,
        }
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn busy_poll_interval(&self) -> Duration {
        Duration::from_millis(self.busy_poll_interval_ms)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }
}

/// Wager provider settings, shared by the bet oracle and the reward gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider base URL
    pub api_endpoint: String,
    /// API key sent with every request
    pub api_key: String,
    /// LINE official account identifier
    pub line_at: String,
    /// Public base URL of this service, used to build the reward callback URL
    pub callback_base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    5
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "http://127.0.0.1:8080".to_string(),
            api_key: String::new(),
            line_at: String::new(),
            callback_base_url: "http://127.0.0.1:3000".to_string(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - MISSION_PROVIDER_API_ENDPOINT
    /// - MISSION_PROVIDER_API_KEY
    /// - MISSION_PROVIDER_LINE_AT
    /// - MISSION_CALLBACK_BASE_URL
    /// - MISSION_PROVIDER_TIMEOUT_SECS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_endpoint: env::var("MISSION_PROVIDER_API_ENDPOINT")
                .unwrap_or(defaults.api_endpoint),
            api_key: env::var("MISSION_PROVIDER_API_KEY").unwrap_or_default(),
            line_at: env::var("MISSION_PROVIDER_LINE_AT").unwrap_or_default(),
            callback_base_url: env::var("MISSION_CALLBACK_BASE_URL")
                .unwrap_or(defaults.callback_base_url),
            timeout_secs: env_parse("MISSION_PROVIDER_TIMEOUT_SECS")
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// URL the reward system calls back with its decision
    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/missions/reward-callback",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

/// User and operator notification channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// LINE messaging API base URL
    pub line_api_url: String,
    /// LINE channel access token
    pub line_channel_token: String,
    /// Telegram bot API base URL
    pub telegram_api_url: String,
    /// Telegram bot token
    pub telegram_bot_token: String,
    /// Telegram chat receiving operator alerts
    pub telegram_chat_id: String,
    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            line_api_url: "https://api.line.me".to_string(),
            line_channel_token: String::new(),
            telegram_api_url: "https://api.telegram.org".to_string(),
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl NotifierConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - MISSION_LINE_API_URL
    /// - MISSION_LINE_CHANNEL_TOKEN
    /// - MISSION_TELEGRAM_API_URL
    /// - MISSION_TELEGRAM_BOT_TOKEN
    /// - MISSION_TELEGRAM_CHAT_ID
    /// - MISSION_NOTIFIER_TIMEOUT_SECS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            line_api_url: env::var("MISSION_LINE_API_URL").unwrap_or(defaults.line_api_url),
            line_channel_token: env::var("MISSION_LINE_CHANNEL_TOKEN").unwrap_or_default(),
            telegram_api_url: env::var("MISSION_TELEGRAM_API_URL")
                .unwrap_or(defaults.telegram_api_url),
            telegram_bot_token: env::var("MISSION_TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            telegram_chat_id: env::var("MISSION_TELEGRAM_CHAT_ID").unwrap_or_default(),
            timeout_secs: env_parse("MISSION_NOTIFIER_TIMEOUT_SECS")
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Whether both channels have credentials
    pub fn is_configured(&self) -> bool {
        !self.line_channel_token.is_empty()
            && !self.telegram_bot_token.is_empty()
            && !self.telegram_chat_id.is_empty()
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl ServiceConfig {
    /// Load every section from the environment
    pub fn from_env() -> Self {
        Self {
            engine: EngineConfig::from_env(),
            provider: ProviderConfig::from_env(),
            notifier: NotifierConfig::from_env(),
        }
    }

    /// Create a development configuration
    pub fn development() -> Self {
        Self {
            engine: EngineConfig::development(),
            provider: ProviderConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.idle_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.busy_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.max_event_attempts, 5);
        assert_eq!(config.display_utc_offset_hours, 7);
    }

    #[test]
    fn test_engine_config_partial_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_event_attempts": 2}"#).unwrap();
        assert_eq!(config.max_event_attempts, 2);
        assert_eq!(config.idle_poll_interval_ms, 5_000);
    }

    #[test]
    fn test_callback_url() {
        let config = ProviderConfig {
            callback_base_url: "https://missions.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.callback_url(),
            "https://missions.example.com/api/missions/reward-callback"
        );
    }

    #[test]
    fn test_notifier_not_configured_by_default() {
        assert!(!NotifierConfig::default().is_configured());
    }

    #[test]
    fn test_development_config() {
        let config = ServiceConfig::development();
        assert_eq!(config.engine.idle_poll_interval_ms, 1_000);
        assert_eq!(config.engine.max_event_attempts, 3);
    }
}
