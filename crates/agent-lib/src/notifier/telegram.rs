//! Telegram Bot API notifier

use super::{async_trait, Notifier, NotifyError};
use crate::settings::TelegramSettings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// `sendMessage` request body
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Envelope every Bot API response carries
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages to one Telegram chat
pub struct TelegramNotifier {
    client: Client,
    endpoint: Url,
    chat_id: String,
    enabled: bool,
    configured: bool,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The endpoint embeds the bot token
        f.debug_struct("TelegramNotifier")
            .field("chat_id", &self.chat_id)
            .field("enabled", &self.enabled)
            .field("configured", &self.configured)
            .finish()
    }
}

impl TelegramNotifier {
    /// Create a notifier from settings with a per-request timeout
    pub fn new(settings: &TelegramSettings, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;

        let base = settings.api_base.trim().trim_end_matches('/');
        let endpoint = Url::parse(&format!(
            "{}/bot{}/sendMessage",
            base,
            settings.bot_token.trim()
        ))
        .map_err(|e| NotifyError::InvalidEndpoint(format!("{}: {}", base, e)))?;

        Ok(Self {
            client,
            endpoint,
            chat_id: settings.chat_id.trim().to_string(),
            enabled: settings.enabled,
            configured: settings.is_configured(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if !self.enabled {
            return Err(NotifyError::Disabled);
        }
        if !self.configured {
            return Err(NotifyError::NotConfigured);
        }

        let escaped = escape_html(text);
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text: &escaped,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.without_url()))?;

        let status = response.status();
        let payload = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(NotifyError::Api {
                status: status.as_u16(),
                description: describe_failure(&payload),
            });
        }

        if let Ok(api) = serde_json::from_str::<ApiResponse>(&payload) {
            if !api.ok {
                return Err(NotifyError::Api {
                    status: status.as_u16(),
                    description: api
                        .description
                        .unwrap_or_else(|| "Unknown error".to_string()),
                });
            }
        }

        debug!(chat_id = %self.chat_id, "Telegram message delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Pull the API's description out of an error body, falling back to the raw text
fn describe_failure(payload: &str) -> String {
    serde_json::from_str::<ApiResponse>(payload)
        .ok()
        .and_then(|api| api.description)
        .unwrap_or_else(|| payload.trim().to_string())
}

/// Escape the characters Telegram's HTML parse mode reserves
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(server: &mockito::ServerGuard) -> TelegramSettings {
        TelegramSettings {
            enabled: true,
            bot_token: "123:abc".to_string(),
            chat_id: "-100200".to_string(),
            api_base: server.url(),
        }
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "chat_id": "-100200",
                "text": "CPU: 95.5% &gt;= 90%",
                "parse_mode": "HTML"
            })))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {}}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&settings(&server), Duration::from_secs(5)).unwrap();
        notifier.send("CPU: 95.5% >= 90%").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&settings(&server), Duration::from_secs(5)).unwrap();
        let err = notifier.send("hello").await.unwrap_err();

        match err {
            NotifyError::Api { status, description } => {
                assert_eq!(status, 400);
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ok_false_body_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok": false}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&settings(&server), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            notifier.send("hello").await,
            Err(NotifyError::Api { status: 200, .. })
        ));
    }

    #[tokio::test]
    async fn test_disabled_and_unconfigured() {
        let server = mockito::Server::new_async().await;

        let mut disabled = settings(&server);
        disabled.enabled = false;
        let notifier = TelegramNotifier::new(&disabled, Duration::from_secs(5)).unwrap();
        assert!(matches!(notifier.send("x").await, Err(NotifyError::Disabled)));

        let mut missing = settings(&server);
        missing.chat_id = String::new();
        let notifier = TelegramNotifier::new(&missing, Duration::from_secs(5)).unwrap();
        assert!(matches!(notifier.send("x").await, Err(NotifyError::NotConfigured)));
    }

    #[test]
    fn test_debug_hides_token() {
        let notifier = TelegramNotifier::new(
            &TelegramSettings {
                bot_token: "secret-token".to_string(),
                chat_id: "1".to_string(),
                ..Default::default()
            },
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!format!("{notifier:?}").contains("secret-token"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
        assert_eq!(escape_html("⚠️ plain"), "⚠️ plain");
    }
}
