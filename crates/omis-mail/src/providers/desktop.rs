use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use omis_core::Clock;
use serde::Deserialize;

use crate::interface::{MailBackendError, MailBackendKind, MailQuery, Mailbox, RawMail};

/// Reads messages that the desktop mail client's export rule drops into a
/// directory, one JSON document (object or array of objects) per file.
#[derive(Clone)]
pub struct DesktopExportMailbox {
    export_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DesktopExportMailbox {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DesktopExportMailbox")
            .field("export_dir", &self.export_dir)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExportDocument {
    One(RawMail),
    Many(Vec<RawMail>),
}

impl DesktopExportMailbox {
    pub fn new(
        export_dir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MailBackendError> {
        let export_dir = export_dir.into();
        if !export_dir.is_dir() {
            return Err(MailBackendError::BackendInitialization(format!(
                "desktop export directory {} does not exist",
                export_dir.display()
            )));
        }
        Ok(Self { export_dir, clock })
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    fn read_export_files(&self) -> Result<Vec<RawMail>, MailBackendError> {
        let entries = std::fs::read_dir(&self.export_dir).map_err(|error| {
            MailBackendError::Fetch(format!(
                "failed to list desktop export directory {}: {error}",
                self.export_dir.display()
            ))
        })?;

        let mut messages = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(error) => {
                    tracing::warn!(%error, "failed to read desktop export entry");
                    continue;
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let parsed = std::fs::read_to_string(&path)
                .map_err(|error| error.to_string())
                .and_then(|raw| {
                    serde_json::from_str::<ExportDocument>(&raw).map_err(|error| error.to_string())
                });
            match parsed {
                Ok(ExportDocument::One(message)) => messages.push(message),
                Ok(ExportDocument::Many(batch)) => messages.extend(batch),
                Err(error) => tracing::warn!(
                    backend = MailBackendKind::Desktop.as_key(),
                    file = %path.display(),
                    %error,
                    "skipping unreadable desktop export file"
                ),
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl Mailbox for DesktopExportMailbox {
    fn kind(&self) -> MailBackendKind {
        MailBackendKind::Desktop
    }

    async fn fetch(&self, query: &MailQuery) -> Result<Vec<RawMail>, MailBackendError> {
        let cutoff = query.cutoff(self.clock.now());
        let mut messages = self
            .read_export_files()?
            .into_iter()
            .filter(|message| message.received_at >= cutoff)
            .collect::<Vec<_>>();
        messages.sort_by(|left, right| right.received_at.cmp(&left.received_at));
        messages.truncate(query.limit_usize());
        Ok(messages)
    }
}
