use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// One inbound message as delivered by a mailbox backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMail {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub sender: String,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailQuery {
    pub limit: u32,
    pub lookback_minutes: u64,
}

impl MailQuery {
    pub fn new(limit: u32, lookback_minutes: u64) -> Self {
        Self {
            limit: limit.max(1),
            lookback_minutes: lookback_minutes.max(1),
        }
    }

    pub fn limit_usize(&self) -> usize {
        usize::try_from(self.limit).unwrap_or(usize::MAX)
    }

    pub fn cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        let minutes = i64::try_from(self.lookback_minutes).unwrap_or(i64::MAX / 60);
        now.checked_sub(time::Duration::minutes(minutes))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailBackendKind {
    Fake,
    OAuth,
    Desktop,
    Auto,
}

impl MailBackendKind {
    pub const fn as_key(self) -> &'static str {
        match self {
            Self::Fake => "mail.fake",
            Self::OAuth => "mail.oauth",
            Self::Desktop => "mail.desktop",
            Self::Auto => "mail.auto",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim() {
            "mail.fake" => Some(Self::Fake),
            "mail.oauth" => Some(Self::OAuth),
            "mail.desktop" => Some(Self::Desktop),
            "mail.auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailBackendError {
    #[error("unknown mail backend key: {0}")]
    UnknownBackendKey(String),
    #[error("failed to initialize mail backend: {0}")]
    BackendInitialization(String),
    #[error("mailbox fetch failed: {0}")]
    Fetch(String),
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    fn kind(&self) -> MailBackendKind;

    /// Newest first, bounded by the query's limit and lookback window.
    async fn fetch(&self, query: &MailQuery) -> Result<Vec<RawMail>, MailBackendError>;

    fn backend_key(&self) -> &'static str {
        self.kind().as_key()
    }
}

#[cfg(test)]
mod tests {
    use super::{MailBackendKind, MailQuery};
    use time::macros::datetime;

    #[test]
    fn backend_kind_keys_roundtrip() {
        for kind in [
            MailBackendKind::Fake,
            MailBackendKind::OAuth,
            MailBackendKind::Desktop,
            MailBackendKind::Auto,
        ] {
            assert_eq!(MailBackendKind::from_key(kind.as_key()), Some(kind));
        }
        assert_eq!(MailBackendKind::from_key("fake"), None);
    }

    #[test]
    fn mail_query_clamps_to_at_least_one() {
        let query = MailQuery::new(0, 0);
        assert_eq!(query.limit, 1);
        assert_eq!(query.lookback_minutes, 1);
        assert_eq!(
            query.cutoff(datetime!(2025-09-27 10:00:00 UTC)),
            datetime!(2025-09-27 09:59:00 UTC)
        );
    }
}
