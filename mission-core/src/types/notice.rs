//! User notices and operator alerts
//!
//! A [`Notice`] names a message template and its placeholder values. It is
//! rendered against the active [`MessageTemplates`] right before dispatch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::MissionId;
use super::tier_config::{MessageTemplate, MessageTemplates};

/// Which template a notice uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Followup,
    MissionSuccess,
    MissionFailed,
    MissionComplete,
    GetReward,
    RewardNotification,
}

/// A user message waiting to be rendered and sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub user_id: String,
    pub mission_id: MissionId,
    pub tier: u32,
    pub level: u32,
    pub kind: MessageKind,
    pub placeholders: BTreeMap<String, String>,
}

impl Notice {
    pub fn new(
        user_id: impl Into<String>,
        mission_id: MissionId,
        tier: u32,
        level: u32,
        kind: MessageKind,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            mission_id,
            tier,
            level,
            kind,
            placeholders: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.placeholders.insert(key.to_string(), value.to_string());
        self
    }

    fn template<'a>(&self, templates: &'a MessageTemplates) -> &'a MessageTemplate {
        match self.kind {
            MessageKind::Followup => &templates.followup,
            MessageKind::MissionSuccess => &templates.mission_success,
            MessageKind::MissionFailed => &templates.mission_failed,
            MessageKind::MissionComplete => &templates.mission_complete,
            MessageKind::GetReward => &templates.get_reward,
            MessageKind::RewardNotification => &templates.reward_notification,
        }
    }

    /// Fill the template for this notice
    pub fn render(&self, templates: &MessageTemplates) -> UserMessage {
        let template = self.template(templates);
        UserMessage {
            user_id: self.user_id.clone(),
            kind: self.kind,
            title: template.title.clone(),
            description: replace_placeholders(&template.description, &self.placeholders),
            sub_description: template
                .sub_description
                .as_deref()
                .map(|s| replace_placeholders(s, &self.placeholders))
                .filter(|s| !s.is_empty()),
            button: match (&template.button_title, &template.button_url) {
                (Some(title), Some(url)) if !title.is_empty() && !url.is_empty() => {
                    Some((title.clone(), url.clone()))
                }
                _ => None,
            },
            image_url: template.image_url.clone(),
        }
    }
}

/// A rendered user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub user_id: String,
    pub kind: MessageKind,
    pub title: String,
    pub description: String,
    pub sub_description: Option<String>,
    /// Button label and link
    pub button: Option<(String, String)>,
    pub image_url: String,
}

/// Message for the operator channel when a reward is claimed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub mission_id: MissionId,
    pub user_id: String,
    pub tier: u32,
    pub level: u32,
    pub reward: u64,
}

impl OperatorAlert {
    /// Telegram HTML body
    pub fn to_html(&self) -> String {
        format!(
            "<b>Request Reward Claimed!</b>\n\n\
             Mission ID: <code>{}</code>\n\
             User ID: <code>{}</code>\n\
             Tier: <b>{}</b>\n\
             Level: <b>{}</b>\n\
             Reward: <b>{}</b>",
            self.mission_id,
            html_escape(&self.user_id),
            self.tier,
            self.level,
            self.reward
        )
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Replace `{key}` markers. Numeric values render as whole numbers with
/// comma thousands separators.
pub fn replace_placeholders(text: &str, placeholders: &BTreeMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in placeholders {
        let rendered = match value.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => format_thousands(n.trunc() as i64),
            _ => value.clone(),
        };
        out = out.replace(&format!("{{{}}}", key), &rendered);
    }
    out
}

/// Format an integer with comma thousands separators
pub fn format_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
        assert_eq!(format_thousands(-12345), "-12,345");
    }

    #[test]
    fn test_numeric_placeholders_truncate_and_group() {
        let mut values = BTreeMap::new();
        values.insert("currentBet".to_string(), "12345.67".to_string());
        values.insert("target".to_string(), "50000".to_string());
        values.insert("name".to_string(), "Bronze".to_string());

        let text = replace_placeholders("{name}: {currentBet} / {target} ({missing})", &values);
        assert_eq!(text, "Bronze: 12,345 / 50,000 ({missing})");
    }

    #[test]
    fn test_render_followup() {
        let templates = MessageTemplates::default();
        let notice = Notice::new("U1", MissionId::from("m1"), 1, 1, MessageKind::Followup)
            .with("target", 1000)
            .with("currentBet", 250.5);

        let message = notice.render(&templates);
        assert_eq!(message.title, "Keep going!");
        assert_eq!(message.description, "You have wagered 250 of 1,000 for this level.");
        assert!(message.button.is_none());
    }

    #[test]
    fn test_render_keeps_button_only_when_complete() {
        let mut templates = MessageTemplates::default();
        templates.get_reward.button_title = Some("Open".to_string());
        let notice = Notice::new("U1", MissionId::from("m1"), 1, 2, MessageKind::GetReward);
        assert!(notice.render(&templates).button.is_none());

        templates.get_reward.button_url = Some("https://example.com".to_string());
        assert_eq!(
            notice.render(&templates).button,
            Some(("Open".to_string(), "https://example.com".to_string()))
        );
    }

    #[test]
    fn test_operator_alert_html() {
        let alert = OperatorAlert {
            mission_id: MissionId::from("m1"),
            user_id: "U<1>".to_string(),
            tier: 2,
            level: 2,
            reward: 500,
        };
        let html = alert.to_html();
        assert!(html.starts_with("<b>Request Reward Claimed!</b>"));
        assert!(html.contains("User ID: <code>U&lt;1&gt;</code>"));
        assert!(html.contains("Reward: <b>500</b>"));
    }
}
