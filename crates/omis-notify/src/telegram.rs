use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("failed to initialize Telegram client: {0}")]
    ClientInitialization(String),
    #[error("Telegram request failed: {0}")]
    Delivery(String),
    #[error("Telegram rejected the message: {0}")]
    Rejected(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub api_url: String,
    pub bot_token: String,
    pub chat_id: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TelegramConfig")
            .field("api_url", &self.api_url)
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_TELEGRAM_API_URL.to_owned(),
            bot_token: String::new(),
            chat_id: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

fn default_ok() -> bool {
    true
}

/// Thin Bot API client; only `sendMessage` is needed.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    config: TelegramConfig,
    client: Client,
}

impl TelegramClient {
    pub fn new(mut config: TelegramConfig) -> Result<Self, NotifyError> {
        if config.bot_token.trim().is_empty() || config.chat_id.trim().is_empty() {
            return Err(NotifyError::ClientInitialization(
                "OMIS_TELEGRAM_TOKEN and OMIS_TELEGRAM_CHAT_ID must both be set".to_owned(),
            ));
        }
        if config.api_url.trim().is_empty() {
            config.api_url = DEFAULT_TELEGRAM_API_URL.to_owned();
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| {
                NotifyError::ClientInitialization(format!(
                    "failed to build Telegram HTTP client: {error}"
                ))
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    fn send_message_endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token.trim()
        )
    }

    pub async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.send_message_endpoint())
            .form(&[
                ("chat_id", self.config.chat_id.trim()),
                ("text", text),
                ("disable_web_page_preview", "true"),
            ])
            .send()
            .await
            // reqwest errors embed the URL, which carries the bot token.
            .map_err(|error| NotifyError::Delivery(error.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| NotifyError::Delivery(error.without_url().to_string()))?;
        if !status.is_success() {
            return Err(NotifyError::Rejected(format!("status {status}: {body}")));
        }

        let parsed = if body.trim().is_empty() {
            SendMessageResponse {
                ok: true,
                description: None,
            }
        } else {
            serde_json::from_str::<SendMessageResponse>(&body).map_err(|error| {
                NotifyError::Delivery(format!("response was malformed JSON: {error}"))
            })?
        };
        if !parsed.ok {
            return Err(NotifyError::Rejected(
                parsed
                    .description
                    .unwrap_or_else(|| "ok=false without description".to_owned()),
            ));
        }
        Ok(())
    }
}
