//! Typed settings slices handed from the loaded config to each subsystem.

use std::path::PathBuf;
use std::time::Duration;

use omis_config::OmisConfig;
use omis_mail::{GraphMailboxConfig, MailBackendSettings, MailQuery};
use omis_notify::NotifierSettings;

pub fn mail_backend_settings(config: &OmisConfig) -> MailBackendSettings {
    let oauth = &config.mail.oauth;
    MailBackendSettings {
        graph: GraphMailboxConfig {
            authority_url: oauth.authority_url.clone(),
            graph_url: oauth.graph_url.clone(),
            tenant_id: oauth.tenant_id.clone(),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone().unwrap_or_default(),
            mailbox: oauth.mailbox.clone(),
            ..GraphMailboxConfig::default()
        },
        desktop_export_dir: PathBuf::from(&config.mail.desktop.export_dir),
    }
}

pub fn mail_query(config: &OmisConfig) -> MailQuery {
    MailQuery::new(config.mail.message_limit, config.mail.lookback_minutes)
}

/// `force_dry_run` only ever switches dry-run on; a config with `dry_run = true`
/// stays dry.
pub fn notifier_settings(config: &OmisConfig, force_dry_run: bool) -> NotifierSettings {
    let notifier = &config.notifier;
    NotifierSettings {
        api_url: notifier.api_url.clone(),
        bot_token: notifier.bot_token.clone(),
        chat_id: notifier.chat_id.clone(),
        dry_run: notifier.dry_run || force_dry_run,
        request_timeout: Duration::from_secs(notifier.request_timeout_secs),
    }
}
