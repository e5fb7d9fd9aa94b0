use std::fmt;
use std::time::Duration;

use omis_core::{CoreError, RequestRecord, RequestStore};

use crate::format::format_delay_message;
use crate::telegram::{NotifyError, TelegramClient, TelegramConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Live,
    DryRun,
    Unconfigured,
}

impl DeliveryMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::DryRun => "dry-run",
            Self::Unconfigured => "unconfigured",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct NotifierSettings {
    pub api_url: String,
    pub bot_token: Option<String>,
    pub chat_id: String,
    pub dry_run: bool,
    pub request_timeout: Duration,
}

impl fmt::Debug for NotifierSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierSettings")
            .field("api_url", &self.api_url)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .field("dry_run", &self.dry_run)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for NotifierSettings {
    fn default() -> Self {
        let telegram = TelegramConfig::default();
        Self {
            api_url: telegram.api_url,
            bot_token: None,
            chat_id: String::new(),
            dry_run: false,
            request_timeout: telegram.request_timeout,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub minutes: u64,
    pub messages: Vec<String>,
    pub sent: usize,
    pub failed: usize,
    pub logged: usize,
}

impl NotifyReport {
    pub fn summary(&self) -> String {
        if self.messages.is_empty() {
            return format!("no requests without updates for more than {} minutes", self.minutes);
        }
        format!(
            "{} delayed requests: {} sent, {} failed, {} logged only",
            self.messages.len(),
            self.sent,
            self.failed,
            self.logged
        )
    }
}

pub struct DelayNotifier {
    mode: DeliveryMode,
    client: Option<TelegramClient>,
}

impl DelayNotifier {
    /// Picks the delivery mode once. Live delivery needs both credentials and
    /// the dry-run flag off.
    pub fn from_settings(settings: NotifierSettings) -> Result<Self, NotifyError> {
        let bot_token = settings
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty());
        let chat_id = settings.chat_id.trim();

        if settings.dry_run {
            return Ok(Self::logging_only(DeliveryMode::DryRun));
        }
        let (Some(bot_token), false) = (bot_token, chat_id.is_empty()) else {
            tracing::warn!(
                "Telegram bot token or chat id missing; delay reminders will only be logged"
            );
            return Ok(Self::logging_only(DeliveryMode::Unconfigured));
        };

        let client = TelegramClient::new(TelegramConfig {
            api_url: settings.api_url,
            bot_token: bot_token.to_owned(),
            chat_id: chat_id.to_owned(),
            request_timeout: settings.request_timeout,
        })?;
        Ok(Self {
            mode: DeliveryMode::Live,
            client: Some(client),
        })
    }

    pub fn logging_only(mode: DeliveryMode) -> Self {
        Self { mode, client: None }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub async fn notify(
        &self,
        store: &dyn RequestStore,
        minutes: u64,
    ) -> Result<NotifyReport, CoreError> {
        let delayed = store.delayed(minutes)?;
        if delayed.is_empty() {
            tracing::debug!(minutes, "no delayed requests");
        }
        Ok(self.deliver(minutes, &delayed).await)
    }

    pub async fn deliver(&self, minutes: u64, records: &[RequestRecord]) -> NotifyReport {
        let mut report = NotifyReport {
            minutes,
            ..NotifyReport::default()
        };

        for record in records {
            let message = format_delay_message(record);
            match (&self.client, self.mode) {
                (Some(client), DeliveryMode::Live) => match client.send_message(&message).await {
                    Ok(()) => {
                        report.sent += 1;
                        tracing::info!(
                            request_number = record.request_number.as_str(),
                            position_number = record.position_number.as_str(),
                            "delay reminder sent"
                        );
                    }
                    Err(error) => {
                        report.failed += 1;
                        tracing::error!(
                            request_number = record.request_number.as_str(),
                            position_number = record.position_number.as_str(),
                            %error,
                            "failed to send delay reminder"
                        );
                    }
                },
                _ => {
                    report.logged += 1;
                    tracing::info!(mode = %self.mode, "{message}");
                }
            }
            report.messages.push(message);
        }
        report
    }
}
