//! Notification Dispatcher
//!
//! User messages go out as LINE flex bubbles, operator alerts as Telegram
//! HTML messages. Delivery failures are reported to the caller, which logs
//! them and carries on.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::NotifierConfig;
use crate::error::{MissionError, MissionResult};
use crate::types::{OperatorAlert, UserMessage};

const ACCENT_COLOR: &str = "#27AE60";

/// Outbound notification channel
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver a rendered message to a user
    async fn send(&self, message: &UserMessage) -> MissionResult<()>;

    /// Notify operators about a reward claim
    async fn alert_operator(&self, alert: &OperatorAlert) -> MissionResult<()>;
}

/// LINE push plus Telegram bot dispatcher
pub struct HttpDispatcher {
    client: Client,
    config: NotifierConfig,
}

impl HttpDispatcher {
    pub fn new(config: NotifierConfig) -> MissionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MissionError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn post(&self, url: String, bearer: Option<&str>, body: &Value) -> MissionResult<()> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MissionError::Notification(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MissionError::Notification(format!(
                "Channel returned status {}: {}",
                status, text
            )));
        }
        Ok(())
    }
}

/// Build the LINE flex bubble for a message
pub fn flex_bubble(message: &UserMessage) -> Value {
    let mut body = vec![
        json!({
            "type": "text",
            "text": message.title,
            "weight": "bold",
            "size": "xl",
            "align": "center",
            "color": ACCENT_COLOR,
        }),
        json!({
            "type": "text",
            "text": message.description,
            "wrap": true,
            "align": "center",
            "size": "md",
        }),
    ];

    if let Some(sub) = &message.sub_description {
        body.push(json!({
            "type": "text",
            "text": sub,
            "wrap": true,
            "align": "center",
            "size": "sm",
            "color": "#888888",
            "margin": "md",
        }));
    }

    let mut bubble = json!({
        "type": "bubble",
        "body": {
            "type": "box",
            "layout": "vertical",
            "contents": body,
        },
    });

    if !message.image_url.is_empty() {
        bubble["hero"] = json!({
            "type": "image",
            "url": message.image_url,
            "size": "full",
            "aspectRatio": "20:13",
            "aspectMode": "cover",
        });
    }

    if let Some((label, uri)) = &message.button {
        bubble["footer"] = json!({
            "type": "box",
            "layout": "vertical",
            "contents": [{
                "type": "button",
                "style": "primary",
                "color": ACCENT_COLOR,
                "height": "md",
                "action": { "type": "uri", "label": label, "uri": uri },
            }],
        });
    }

    bubble
}

#[async_trait]
impl NotificationDispatcher for HttpDispatcher {
    async fn send(&self, message: &UserMessage) -> MissionResult<()> {
        let body = json!({
            "to": message.user_id,
            "messages": [{
                "type": "flex",
                "altText": message.title,
                "contents": flex_bubble(message),
            }],
        });

        let url = format!(
            "{}/v2/bot/message/push",
            self.config.line_api_url.trim_end_matches('/')
        );
        self.post(url, Some(&self.config.line_channel_token), &body).await?;
        debug!("Pushed {:?} message to {}", message.kind, message.user_id);
        Ok(())
    }

    async fn alert_operator(&self, alert: &OperatorAlert) -> MissionResult<()> {
        let body = json!({
            "chat_id": self.config.telegram_chat_id,
            "text": alert.to_html(),
            "parse_mode": "HTML",
        });

        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.telegram_api_url.trim_end_matches('/'),
            self.config.telegram_bot_token
        );
        self.post(url, None, &body).await?;
        debug!("Sent operator alert for mission {}", alert.mission_id);
        Ok(())
    }
}

/// Dispatcher that logs and keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    messages: Mutex<Vec<UserMessage>>,
    alerts: Mutex<Vec<OperatorAlert>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<UserMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<OperatorAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, message: &UserMessage) -> MissionResult<()> {
        info!(
            "[notice] {:?} to {}: {} - {}",
            message.kind, message.user_id, message.title, message.description
        );
        self.messages
            .lock()
            .map_err(|_| MissionError::Notification("recorder poisoned".to_string()))?
            .push(message.clone());
        Ok(())
    }

    async fn alert_operator(&self, alert: &OperatorAlert) -> MissionResult<()> {
        info!(
            "[operator] reward claimed: mission {} user {} tier {} level {} reward {}",
            alert.mission_id, alert.user_id, alert.tier, alert.level, alert.reward
        );
        self.alerts
            .lock()
            .map_err(|_| MissionError::Notification("recorder poisoned".to_string()))?
            .push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKind, MissionId};
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    type Captured = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    async fn start_channel() -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));

        async fn record(
            State(captured): State<Captured>,
            uri: axum::http::Uri,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            captured.lock().unwrap().push((uri.path().to_string(), auth, body));
            Json(json!({ "ok": true }))
        }

        let router = Router::new()
            .route("/v2/bot/message/push", post(record))
            .route("/bottoken/sendMessage", post(record))
            .with_state(captured.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    fn message(button: Option<(String, String)>) -> UserMessage {
        UserMessage {
            user_id: "U1".to_string(),
            kind: MessageKind::MissionComplete,
            title: "Tier complete".to_string(),
            description: "Claim within 3 days.".to_string(),
            sub_description: None,
            button,
            image_url: String::new(),
        }
    }

    #[test]
    fn test_flex_bubble_optional_parts() {
        let plain = flex_bubble(&message(None));
        assert!(plain.get("footer").is_none());
        assert!(plain.get("hero").is_none());
        assert_eq!(plain["body"]["contents"].as_array().unwrap().len(), 2);

        let with_button = flex_bubble(&message(Some(("Claim".into(), "https://x.test".into()))));
        assert_eq!(with_button["footer"]["contents"][0]["action"]["uri"], "https://x.test");
    }

    #[tokio::test]
    async fn test_http_dispatcher_posts_to_both_channels() {
        let (base, captured) = start_channel().await;
        let dispatcher = HttpDispatcher::new(NotifierConfig {
            line_api_url: base.clone(),
            line_channel_token: "line-token".to_string(),
            telegram_api_url: base,
            telegram_bot_token: "token".to_string(),
            telegram_chat_id: "-100".to_string(),
            timeout_secs: 5,
        })
        .unwrap();

        dispatcher.send(&message(None)).await.unwrap();
        dispatcher
            .alert_operator(&OperatorAlert {
                mission_id: MissionId::from("m1"),
                user_id: "U1".to_string(),
                tier: 1,
                level: 2,
                reward: 100,
            })
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 2);

        let (path, auth, body) = &captured[0];
        assert_eq!(path, "/v2/bot/message/push");
        assert_eq!(auth.as_deref(), Some("Bearer line-token"));
        assert_eq!(body["to"], "U1");
        assert_eq!(body["messages"][0]["type"], "flex");

        let (path, _, body) = &captured[1];
        assert_eq!(path, "/bottoken/sendMessage");
        assert_eq!(body["chat_id"], "-100");
        assert_eq!(body["parse_mode"], "HTML");
    }

    #[tokio::test]
    async fn test_recording_dispatcher() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher.send(&message(None)).await.unwrap();
        assert_eq!(dispatcher.messages().len(), 1);
        assert!(dispatcher.alerts().is_empty());
    }
}
