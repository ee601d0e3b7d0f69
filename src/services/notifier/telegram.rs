use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use crate::config::TelegramSettings;
use crate::services::notifier::{AdminNotifier, NotifyError};

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

/// Sends admin notices through the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    pub client: Client,
    pub settings: TelegramSettings,
}

impl TelegramNotifier {
    pub fn new(client: Client, settings: TelegramSettings) -> Self {
        Self { client, settings }
    }

    fn send_message_url(&self, token: &str) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.settings.api_base_url.trim_end_matches('/'),
            token
        )
    }
}

#[async_trait]
impl AdminNotifier for TelegramNotifier {
    async fn send_message_with_admin(&self, text: &str, markdown: bool) -> Result<(), NotifyError> {
        let token = match self.settings.bot_token.as_deref() {
            Some(token) if !self.settings.admin_chat_ids.is_empty() => token,
            _ => return Err(NotifyError::NotConfigured),
        };
        let url = self.send_message_url(token);

        // Every admin gets the notice even if an earlier chat fails.
        let mut first_error = None;
        for chat_id in &self.settings.admin_chat_ids {
            let payload = SendMessageRequest {
                chat_id: *chat_id,
                text,
                parse_mode: markdown.then_some("markdown"),
            };
            let result = match self.client.post(&url).json(&payload).send().await {
                Ok(res) if res.status().is_success() => Ok(()),
                Ok(res) => {
                    let status = res.status().as_u16();
                    let body = res.text().await.unwrap_or_default();
                    Err(NotifyError::Api { status, body })
                }
                Err(err) => Err(NotifyError::from(err)),
            };
            if let Err(err) = result {
                warn!(%err, chat_id, "telegram sendMessage failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
