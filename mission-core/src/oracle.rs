//! Bet Oracle
//!
//! Source of a user's accumulated wager over a time window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{MissionError, MissionResult};

/// Wager activity source
#[async_trait]
pub trait BetOracle: Send + Sync {
    /// Total qualifying wager of `user_id` in `[start, end]`
    async fn get_activity(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MissionResult<f64>;
}

#[derive(Debug, Deserialize)]
struct BetResponse {
    bet: f64,
}

/// Oracle backed by the wager provider's HTTP API
pub struct HttpBetOracle {
    client: Client,
    config: ProviderConfig,
}

impl HttpBetOracle {
    pub fn new(config: ProviderConfig) -> MissionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MissionError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn bets_url(&self) -> String {
        format!(
            "{}/players/v1/line/bets",
            self.config.api_endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl BetOracle for HttpBetOracle {
    async fn get_activity(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MissionResult<f64> {
        debug!("Fetching bets for user {} from {} to {}", user_id, start, end);

        let response = self
            .client
            .get(self.bets_url())
            .header("API-KEY", &self.config.api_key)
            .query(&[
                ("line_id", user_id.to_string()),
                ("line_at", self.config.line_at.clone()),
                ("start_date", start.timestamp().to_string()),
                ("end_date", end.timestamp().to_string()),
            ])
            .send()
            .await
            .map_err(|e| MissionError::Oracle(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(MissionError::Oracle(format!("Provider returned status {}", status)));
        }

        let body: BetResponse = response
            .json()
            .await
            .map_err(|e| MissionError::Oracle(format!("Invalid response body: {}", e)))?;

        debug!("User {} bet {:.2}", user_id, body.bet);
        Ok(body.bet)
    }
}

/// Oracle returning a settable amount, for development and tests
#[derive(Debug, Default)]
pub struct FixedBetOracle {
    amount: Mutex<Option<f64>>,
}

impl FixedBetOracle {
    pub fn new(amount: f64) -> Self {
        Self {
            amount: Mutex::new(Some(amount)),
        }
    }

    /// An oracle whose every call fails
    pub fn unavailable() -> Self {
        Self {
            amount: Mutex::new(None),
        }
    }

    pub fn set(&self, amount: Option<f64>) {
        if let Ok(mut guard) = self.amount.lock() {
            *guard = amount;
        }
    }
}

#[async_trait]
impl BetOracle for FixedBetOracle {
    async fn get_activity(
        &self,
        _user_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> MissionResult<f64> {
        let amount = *self
            .amount
            .lock()
            .map_err(|_| MissionError::Oracle("oracle state poisoned".to_string()))?;
        amount.ok_or_else(|| MissionError::Oracle("oracle unavailable".to_string()))
    }
}
