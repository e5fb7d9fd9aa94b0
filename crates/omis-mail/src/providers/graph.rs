use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use omis_core::Clock;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::interface::{MailBackendError, MailBackendKind, MailQuery, Mailbox, RawMail};

const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Clone, PartialEq, Eq)]
pub struct GraphMailboxConfig {
    pub authority_url: String,
    pub graph_url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub mailbox: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for GraphMailboxConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GraphMailboxConfig")
            .field("authority_url", &self.authority_url)
            .field("graph_url", &self.graph_url)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for GraphMailboxConfig {
    fn default() -> Self {
        Self {
            authority_url: DEFAULT_AUTHORITY_URL.to_owned(),
            graph_url: DEFAULT_GRAPH_URL.to_owned(),
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            mailbox: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl GraphMailboxConfig {
    pub fn has_credentials(&self) -> bool {
        self.missing_fields().is_empty()
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("OMIS_OUTLOOK_TENANT_ID", &self.tenant_id),
            ("OMIS_OUTLOOK_CLIENT_ID", &self.client_id),
            ("OMIS_OUTLOOK_CLIENT_SECRET", &self.client_secret),
            ("OMIS_OUTLOOK_EMAIL", &self.mailbox),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Microsoft Graph inbox reader authenticated with the client-credentials flow.
#[derive(Clone)]
pub struct GraphMailbox {
    config: GraphMailboxConfig,
    client: Client,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for GraphMailbox {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GraphMailbox")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<GraphBody>,
    #[serde(default)]
    body_preview: Option<String>,
    #[serde(default)]
    from: Option<GraphRecipient>,
    received_date_time: String,
}

#[derive(Debug, Deserialize)]
struct GraphBody {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: GraphEmailAddress,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    #[serde(default)]
    address: String,
}

impl GraphMailbox {
    pub fn new(
        mut config: GraphMailboxConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MailBackendError> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(MailBackendError::BackendInitialization(format!(
                "Outlook OAuth credentials are incomplete; missing {}",
                missing.join(", ")
            )));
        }
        if config.authority_url.trim().is_empty() {
            config.authority_url = DEFAULT_AUTHORITY_URL.to_owned();
        }
        if config.graph_url.trim().is_empty() {
            config.graph_url = DEFAULT_GRAPH_URL.to_owned();
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "Prefer",
            header::HeaderValue::from_static("outlook.body-content-type=\"text\""),
        );
        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| {
                MailBackendError::BackendInitialization(format!(
                    "failed to build Microsoft Graph HTTP client: {error}"
                ))
            })?;

        Ok(Self {
            config,
            client,
            clock,
        })
    }

    pub fn config(&self) -> &GraphMailboxConfig {
        &self.config
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_url.trim_end_matches('/'),
            self.config.tenant_id.trim()
        )
    }

    fn messages_endpoint(&self) -> String {
        format!(
            "{}/users/{}/mailFolders/inbox/messages",
            self.config.graph_url.trim_end_matches('/'),
            self.config.mailbox.trim()
        )
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, MailBackendError> {
        let response = request.send().await.map_err(|error| {
            MailBackendError::Fetch(format!("{what} request failed: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            MailBackendError::Fetch(format!("{what} response read failed: {error}"))
        })?;

        if !status.is_success() {
            return Err(MailBackendError::Fetch(format!(
                "{what} request failed with status {status}: {body}"
            )));
        }

        serde_json::from_str(&body).map_err(|error| {
            MailBackendError::Fetch(format!("{what} response was malformed JSON: {error}"))
        })
    }

    async fn acquire_token(&self) -> Result<String, MailBackendError> {
        let request = self.client.post(self.token_endpoint()).form(&[
            ("client_id", self.config.client_id.trim()),
            ("client_secret", self.config.client_secret.trim()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ]);
        let token: TokenResponse = self.request_json(request, "OAuth token").await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl Mailbox for GraphMailbox {
    fn kind(&self) -> MailBackendKind {
        MailBackendKind::OAuth
    }

    async fn fetch(&self, query: &MailQuery) -> Result<Vec<RawMail>, MailBackendError> {
        let token = self.acquire_token().await?;
        let cutoff = query
            .cutoff(self.clock.now())
            .replace_nanosecond(0)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
            .format(&Rfc3339)
            .map_err(|error| MailBackendError::Fetch(format!("invalid lookback cutoff: {error}")))?;

        let request = self
            .client
            .get(self.messages_endpoint())
            .bearer_auth(token)
            .query(&[
                ("$top", query.limit.to_string()),
                ("$filter", format!("receivedDateTime ge {cutoff}")),
                ("$orderby", "receivedDateTime desc".to_owned()),
                (
                    "$select",
                    "subject,body,bodyPreview,from,receivedDateTime".to_owned(),
                ),
            ]);
        let page: MessagePage = self.request_json(request, "Microsoft Graph messages").await?;

        let mut messages = Vec::with_capacity(page.value.len());
        for message in page.value {
            let received_at = match OffsetDateTime::parse(&message.received_date_time, &Rfc3339) {
                Ok(received_at) => received_at,
                Err(error) => {
                    tracing::warn!(
                        backend = MailBackendKind::OAuth.as_key(),
                        received = message.received_date_time.as_str(),
                        %error,
                        "skipping Graph message with unreadable receivedDateTime"
                    );
                    continue;
                }
            };
            let body = message
                .body
                .map(|body| body.content)
                .filter(|content| !content.trim().is_empty())
                .or(message.body_preview)
                .unwrap_or_default();
            messages.push(RawMail {
                subject: message.subject.unwrap_or_default(),
                body,
                sender: message
                    .from
                    .map(|from| from.email_address.address)
                    .unwrap_or_default(),
                received_at,
            });
        }

        messages.sort_by(|left, right| right.received_at.cmp(&left.received_at));
        messages.truncate(query.limit_usize());
        tracing::debug!(
            backend = MailBackendKind::OAuth.as_key(),
            count = messages.len(),
            "fetched Graph inbox messages"
        );
        Ok(messages)
    }
}
