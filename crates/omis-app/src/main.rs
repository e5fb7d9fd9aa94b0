use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use omis_app::{load_scenarios, App, AppError, MailOptions, NotifyOptions, RunOptions};
use omis_config::OmisConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "omis", version, about = "Contractor request tracker")]
struct Cli {
    /// Config file; defaults to `OMIS_CONFIG`, then `~/.config/omis/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the web interface.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Scan the mailbox once and apply contractor status updates.
    CheckMail(MailArgs),
    /// Report requests without status updates once.
    Notify(NotifyArgs),
    /// Scheduled batch job: mail first, then delay reminders.
    Run {
        #[arg(long)]
        skip_mail: bool,
        #[arg(long)]
        skip_notifier: bool,
        #[arg(long)]
        fake_mail: bool,
        #[arg(long)]
        mail_backend: Option<String>,
        #[command(flatten)]
        notify: NotifyArgs,
    },
    /// Run a scripted scenario from a JSON file.
    Scenario {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, required_unless_present = "list")]
        scenario: Option<String>,
        #[arg(long)]
        list: bool,
    },
}

#[derive(Debug, Args)]
struct MailArgs {
    /// Use the built-in contractor messages instead of a real mailbox.
    #[arg(long)]
    fake: bool,
    /// Backend key such as `mail.oauth`, `mail.desktop`, `mail.fake` or `mail.auto`.
    #[arg(long)]
    backend: Option<String>,
}

#[derive(Debug, Args)]
struct NotifyArgs {
    /// Delay threshold in minutes; defaults to `notifier.delay_minutes`.
    #[arg(long)]
    minutes: Option<u64>,
    /// Log reminders instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

impl From<NotifyArgs> for NotifyOptions {
    fn from(args: NotifyArgs) -> Self {
        Self {
            minutes: args.minutes,
            dry_run: args.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.log_level.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    let app = App::new(config);
    match cli.command {
        Command::Serve { bind } => {
            app.serve(bind.as_deref(), shutdown_signal()).await?;
        }
        Command::CheckMail(args) => {
            let report = app
                .check_mail(&MailOptions {
                    fake: args.fake,
                    backend: args.backend,
                })
                .await?;
            for line in report.summary_lines() {
                println!("{line}");
            }
            println!("{}", report.summary());
        }
        Command::Notify(args) => {
            let report = app.notify(&args.into()).await?;
            for message in &report.messages {
                println!("{message}\n");
            }
            println!("{}", report.summary());
        }
        Command::Run {
            skip_mail,
            skip_notifier,
            fake_mail,
            mail_backend,
            notify,
        } => {
            let report = app
                .run(&RunOptions {
                    skip_mail,
                    skip_notifier,
                    mail: MailOptions {
                        fake: fake_mail,
                        backend: mail_backend,
                    },
                    notify: notify.into(),
                })
                .await?;
            if let Some(mail) = &report.mail {
                println!("{}", mail.summary());
            }
            if let Some(notify) = &report.notify {
                println!("{}", notify.summary());
            }
        }
        Command::Scenario {
            file,
            scenario,
            list,
        } => {
            let book = load_scenarios(&file)?;
            if list {
                for name in book.names() {
                    println!("{name}");
                }
                return Ok(());
            }
            let name = scenario.ok_or_else(|| {
                AppError::configuration("--scenario is required unless --list is given")
            })?;
            let steps = book.plan(&name)?;
            tracing::info!(scenario = name.as_str(), file = %file.display(), "running scenario");
            for line in app.run_scenario(&steps).await? {
                println!("{line}");
            }
            tracing::info!(scenario = name.as_str(), "scenario completed");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<OmisConfig, AppError> {
    match path {
        Some(path) => {
            let mut config = omis_config::load_from_path(path)?;
            config.apply_env_overrides()?;
            Ok(config)
        }
        None => Ok(omis_config::load_from_env()?),
    }
}

/// `RUST_LOG` wins, then `--log-level`, then `logging.level`.
fn init_logging(config: &OmisConfig, level_flag: Option<&str>) -> Result<(), AppError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = level_flag.unwrap_or(config.logging.level.as_str());
            EnvFilter::try_new(level).map_err(|error| {
                AppError::configuration(format!("invalid log level '{level}': {error}"))
            })?
        }
    };

    let Some(log_file) = config.log_file() else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    };

    let log_path = Path::new(log_file);
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|error| {
                AppError::configuration(format!(
                    "failed to create omis log directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|error| {
            AppError::configuration(format!(
                "failed to open omis log file '{}': {error}",
                log_path.display()
            ))
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for ctrl-c; web interface will not stop gracefully");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
