use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

use crate::{config::Settings, models::TrackedItem};

use super::fetcher::snippet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent(String),
    // not configured; not an error
    Skipped(String),
    Failed(String),
}

impl NotifyOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, NotifyOutcome::Sent(_))
    }

    pub fn detail(&self) -> &str {
        match self {
            NotifyOutcome::Sent(d) | NotifyOutcome::Skipped(d) | NotifyOutcome::Failed(d) => d,
        }
    }
}

/// Outbound alert channel. Implementations report every problem through
/// the outcome; `send` itself never fails.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> NotifyOutcome;
}

#[derive(Clone)]
pub struct TelegramNotifier {
    http: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: &str, chat_id: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.telegram_api_base,
            &settings.telegram_bot_token,
            &settings.telegram_chat_id,
        )
    }

    fn has_credentials(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> NotifyOutcome {
        if !self.has_credentials() {
            return NotifyOutcome::Skipped("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set".to_string());
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": false,
        });

        let res = match self.http.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return NotifyOutcome::Failed(format!("telegram request failed: {}", e.without_url())),
        };

        let status = res.status();
        let provider = res.text().await.unwrap_or_default();
        let provider = snippet(&provider, 500);

        if status.is_success() {
            NotifyOutcome::Sent(provider)
        } else {
            NotifyOutcome::Failed(format!("telegram {status}: {provider}"))
        }
    }
}

pub fn format_alert(item: &TrackedItem, price: f64, currency: &str) -> String {
    format!(
        "🚨 PRICE DROP!\n\n{}\nCurrent: {currency}{price:.2}\nTarget: {currency}{:.2}\n{}",
        item.name, item.target_price, item.url
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn missing_credentials_skip_without_network() {
        let n = TelegramNotifier::new("http://127.0.0.1:9", "", "123");
        let out = n.send("hi").await;
        assert!(matches!(out, NotifyOutcome::Skipped(_)));
        assert!(!out.is_sent());
    }

    #[tokio::test]
    async fn posts_text_to_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": "42", "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let n = TelegramNotifier::new(&server.uri(), "TOKEN", "42");
        let out = n.send("hello").await;
        assert_eq!(out, NotifyOutcome::Sent(r#"{"ok":true}"#.to_string()));
    }

    #[tokio::test]
    async fn provider_error_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let n = TelegramNotifier::new(&server.uri(), "bad", "42");
        let out = n.send("hello").await;
        assert!(matches!(out, NotifyOutcome::Failed(ref d) if d.contains("Unauthorized")));
    }

    #[tokio::test]
    async fn transport_error_is_failed() {
        let n = TelegramNotifier::new("http://127.0.0.1:9", "TOKEN", "42");
        assert!(matches!(n.send("x").await, NotifyOutcome::Failed(_)));
    }

    #[test]
    fn alert_text_has_name_prices_and_url() {
        let item = TrackedItem {
            id: "a".into(),
            name: "Headphones".into(),
            url: "https://shop.example/h".into(),
            target_price: 500.0,
            last_alert_at: None,
            created_at: Utc::now(),
        };
        let text = format_alert(&item, 450.0, "₹");
        assert!(text.contains("Headphones"));
        assert!(text.contains("₹450.00"));
        assert!(text.contains("₹500.00"));
        assert!(text.contains("https://shop.example/h"));
    }
}
