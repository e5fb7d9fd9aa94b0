use std::path::PathBuf;
use std::sync::Arc;

use omis_core::Clock;

use crate::interface::{MailBackendError, MailBackendKind, Mailbox};
use crate::providers::{
    desktop::DesktopExportMailbox,
    fake::FakeMailbox,
    graph::{GraphMailbox, GraphMailboxConfig},
};

const SUPPORTED_BACKEND_KEYS: [&str; 4] = [
    MailBackendKind::Fake.as_key(),
    MailBackendKind::OAuth.as_key(),
    MailBackendKind::Desktop.as_key(),
    MailBackendKind::Auto.as_key(),
];

/// Everything any backend may need; each backend reads only its own part.
#[derive(Debug, Clone, Default)]
pub struct MailBackendSettings {
    pub graph: GraphMailboxConfig,
    pub desktop_export_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub enum MailboxFactoryOutput {
    Fake(FakeMailbox),
    Graph(GraphMailbox),
    Desktop(DesktopExportMailbox),
}

impl MailboxFactoryOutput {
    pub fn kind(&self) -> MailBackendKind {
        match self {
            Self::Fake(mailbox) => mailbox.kind(),
            Self::Graph(mailbox) => mailbox.kind(),
            Self::Desktop(mailbox) => mailbox.kind(),
        }
    }

    pub fn into_mailbox(self) -> Box<dyn Mailbox> {
        match self {
            Self::Fake(mailbox) => Box::new(mailbox),
            Self::Graph(mailbox) => Box::new(mailbox),
            Self::Desktop(mailbox) => Box::new(mailbox),
        }
    }
}

pub fn supported_backend_keys() -> &'static [&'static str] {
    &SUPPORTED_BACKEND_KEYS
}

pub fn resolve_backend_kind(backend_key: &str) -> Result<MailBackendKind, MailBackendError> {
    MailBackendKind::from_key(backend_key)
        .ok_or_else(|| MailBackendError::UnknownBackendKey(backend_key.to_owned()))
}

/// Builds the mailbox for `backend_key`. Only an unknown key is an error; a
/// backend that cannot be initialized degrades to the fake dataset.
pub fn build_mailbox(
    backend_key: &str,
    settings: &MailBackendSettings,
    clock: Arc<dyn Clock>,
) -> Result<MailboxFactoryOutput, MailBackendError> {
    let requested = resolve_backend_kind(backend_key)?;
    let kind = match requested {
        MailBackendKind::Auto => resolve_auto(settings),
        other => other,
    };

    let built = match kind {
        MailBackendKind::Fake | MailBackendKind::Auto => {
            Ok(MailboxFactoryOutput::Fake(FakeMailbox::contractor_dataset()))
        }
        MailBackendKind::OAuth => {
            GraphMailbox::new(settings.graph.clone(), clock).map(MailboxFactoryOutput::Graph)
        }
        MailBackendKind::Desktop => {
            DesktopExportMailbox::new(settings.desktop_export_dir.clone(), clock)
                .map(MailboxFactoryOutput::Desktop)
        }
    };

    match built {
        Ok(mailbox) => {
            tracing::info!(
                requested = requested.as_key(),
                backend = mailbox.kind().as_key(),
                "mail backend selected"
            );
            Ok(mailbox)
        }
        Err(error) => {
            tracing::warn!(
                requested = requested.as_key(),
                backend = MailBackendKind::Fake.as_key(),
                %error,
                "mail backend unavailable; falling back to the fake dataset"
            );
            Ok(MailboxFactoryOutput::Fake(FakeMailbox::contractor_dataset()))
        }
    }
}

fn resolve_auto(settings: &MailBackendSettings) -> MailBackendKind {
    if settings.graph.has_credentials() {
        MailBackendKind::OAuth
    } else if settings.desktop_export_dir.is_dir() {
        MailBackendKind::Desktop
    } else {
        tracing::warn!(
            backend = MailBackendKind::Fake.as_key(),
            "no Outlook credentials or desktop export directory configured; using the fake dataset"
        );
        MailBackendKind::Fake
    }
}
