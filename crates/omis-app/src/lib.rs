//! Composition root for the `omis` binary: one [`App`] per process, one store
//! connection per operation.

pub mod composition;
pub mod error;
pub mod scenario;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use omis_config::OmisConfig;
use omis_core::{Clock, SqliteRequestStore, SystemClock};
use omis_mail::{build_mailbox, IngestReport, MailBackendKind, MailIngester};
use omis_notify::{DelayNotifier, NotifyReport};
use omis_web::WebState;
use tokio::net::TcpListener;

pub use error::{AppError, AppResult};
pub use scenario::{load_scenarios, ScenarioBook, ScenarioStep};

/// Mail source selection for one ingest pass. `fake` wins over `backend`,
/// which wins over the configured `mail_backend`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailOptions {
    pub fake: bool,
    pub backend: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyOptions {
    pub minutes: Option<u64>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub skip_mail: bool,
    pub skip_notifier: bool,
    pub mail: MailOptions,
    pub notify: NotifyOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub mail: Option<IngestReport>,
    pub notify: Option<NotifyReport>,
}

pub struct App {
    config: OmisConfig,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn new(config: OmisConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: OmisConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &OmisConfig {
        &self.config
    }

    pub fn database_path(&self) -> &Path {
        Path::new(&self.config.database_path)
    }

    pub fn open_store(&self) -> AppResult<SqliteRequestStore> {
        Ok(SqliteRequestStore::open_with_clock(
            self.database_path(),
            Arc::clone(&self.clock),
        )?)
    }

    pub fn mail_backend_key(&self, options: &MailOptions) -> String {
        if options.fake {
            return MailBackendKind::Fake.as_key().to_owned();
        }
        match options.backend.as_deref().map(str::trim) {
            Some(backend) if !backend.is_empty() => qualify_mail_backend(backend),
            _ => self.config.mail_backend.clone(),
        }
    }

    /// One mailbox scan applied to the store.
    pub async fn check_mail(&self, options: &MailOptions) -> AppResult<IngestReport> {
        let backend_key = self.mail_backend_key(options);
        let mailbox = build_mailbox(
            &backend_key,
            &composition::mail_backend_settings(&self.config),
            Arc::clone(&self.clock),
        )?;
        let ingester = MailIngester::new(
            mailbox.into_mailbox(),
            composition::mail_query(&self.config),
        );

        let mut store = self.open_store()?;
        Ok(ingester.run(&mut store).await?)
    }

    /// One delay check; `minutes` defaults to `notifier.delay_minutes`.
    pub async fn notify(&self, options: &NotifyOptions) -> AppResult<NotifyReport> {
        let minutes = options.minutes.unwrap_or(self.config.notifier.delay_minutes);
        let notifier = DelayNotifier::from_settings(composition::notifier_settings(
            &self.config,
            options.dry_run,
        ))?;
        tracing::info!(minutes, mode = %notifier.mode(), "checking for delayed requests");

        let store = self.open_store()?;
        Ok(notifier.notify(&store, minutes).await?)
    }

    /// The scheduled batch job: ingest first so fresh statuses are not
    /// reported as delays, then notify.
    pub async fn run(&self, options: &RunOptions) -> AppResult<RunReport> {
        let mut report = RunReport::default();

        if options.skip_mail {
            tracing::info!("mail processing skipped");
        } else {
            let ingest = self.check_mail(&options.mail).await?;
            if ingest.lines.is_empty() {
                tracing::info!(backend = ingest.backend.as_str(), "no new contractor mail");
            }
            for line in ingest.summary_lines() {
                tracing::info!("MAIL: {line}");
            }
            report.mail = Some(ingest);
        }

        if options.skip_notifier {
            tracing::info!("delay check skipped");
        } else {
            let notify = self.notify(&options.notify).await?;
            tracing::info!("NOTIFY: {}", notify.summary());
            report.notify = Some(notify);
        }

        Ok(report)
    }

    pub fn web_state(&self) -> WebState {
        WebState::new(self.database_path(), Arc::clone(&self.clock))
    }

    /// Serves the web interface until `shutdown` resolves. The store is opened
    /// once up front so an unusable database fails startup instead of the
    /// first page load.
    pub async fn serve(
        &self,
        bind_address: Option<&str>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> AppResult<()> {
        drop(self.open_store()?);

        let bind_address = bind_address.unwrap_or(self.config.web.bind_address.as_str());
        let listener = TcpListener::bind(bind_address).await.map_err(|error| {
            AppError::dependency_unavailable(format!(
                "failed to bind web interface to '{bind_address}': {error}"
            ))
        })?;
        omis_web::serve(listener, self.web_state(), shutdown)
            .await
            .map_err(|error| {
                AppError::dependency_unavailable(format!("web interface stopped: {error}"))
            })
    }
}

/// Accepts both `mail.fake` and the bare `fake` shorthand.
fn qualify_mail_backend(backend: &str) -> String {
    if backend.contains('.') {
        backend.to_owned()
    } else {
        format!("mail.{backend}")
    }
}
