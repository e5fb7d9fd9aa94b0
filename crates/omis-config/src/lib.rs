use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_OMIS_CONFIG: &str = "OMIS_CONFIG";
pub const ENV_OMIS_DB_FILE: &str = "OMIS_DB_FILE";
pub const ENV_OMIS_MAIL_BACKEND: &str = "OMIS_MAIL_BACKEND";
pub const ENV_OMIS_TELEGRAM_TOKEN: &str = "OMIS_TELEGRAM_TOKEN";
pub const ENV_OMIS_TELEGRAM_CHAT_ID: &str = "OMIS_TELEGRAM_CHAT_ID";
pub const ENV_OMIS_OUTLOOK_TENANT_ID: &str = "OMIS_OUTLOOK_TENANT_ID";
pub const ENV_OMIS_OUTLOOK_CLIENT_ID: &str = "OMIS_OUTLOOK_CLIENT_ID";
pub const ENV_OMIS_OUTLOOK_CLIENT_SECRET: &str = "OMIS_OUTLOOK_CLIENT_SECRET";
pub const ENV_OMIS_OUTLOOK_EMAIL: &str = "OMIS_OUTLOOK_EMAIL";

const DEFAULT_MAIL_BACKEND: &str = "mail.auto";
const DEFAULT_MAIL_MESSAGE_LIMIT: u32 = 50;
const MAX_MAIL_MESSAGE_LIMIT: u32 = 500;
const DEFAULT_MAIL_LOOKBACK_MINUTES: u64 = 1_440;
const MAX_MAIL_LOOKBACK_MINUTES: u64 = 43_200;
const DEFAULT_OAUTH_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_NOTIFIER_DELAY_MINUTES: u64 = 60;
const MAX_NOTIFIER_DELAY_MINUTES: u64 = 525_600;
const DEFAULT_NOTIFIER_REQUEST_TIMEOUT_SECS: u64 = 10;
const MAX_NOTIFIER_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_WEB_BIND_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OmisConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_mail_backend")]
    pub mail_backend: String,
    #[serde(default)]
    pub mail: MailConfigToml,
    #[serde(default)]
    pub notifier: NotifierConfigToml,
    #[serde(default)]
    pub web: WebConfigToml,
    #[serde(default)]
    pub logging: LoggingConfigToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailConfigToml {
    #[serde(default = "default_mail_message_limit")]
    pub message_limit: u32,
    #[serde(default = "default_mail_lookback_minutes")]
    pub lookback_minutes: u64,
    #[serde(default)]
    pub oauth: OAuthMailConfigToml,
    #[serde(default)]
    pub desktop: DesktopMailConfigToml,
}

impl Default for MailConfigToml {
    fn default() -> Self {
        Self {
            message_limit: default_mail_message_limit(),
            lookback_minutes: default_mail_lookback_minutes(),
            oauth: OAuthMailConfigToml::default(),
            desktop: DesktopMailConfigToml::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthMailConfigToml {
    #[serde(default = "default_oauth_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub mailbox: String,
    /// Only ever supplied through `OMIS_OUTLOOK_CLIENT_SECRET`.
    #[serde(skip)]
    pub client_secret: Option<String>,
}

impl Default for OAuthMailConfigToml {
    fn default() -> Self {
        Self {
            authority_url: default_oauth_authority_url(),
            graph_url: default_graph_url(),
            tenant_id: String::new(),
            client_id: String::new(),
            mailbox: String::new(),
            client_secret: None,
        }
    }
}

impl fmt::Debug for OAuthMailConfigToml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthMailConfigToml")
            .field("authority_url", &self.authority_url)
            .field("graph_url", &self.graph_url)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("mailbox", &self.mailbox)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DesktopMailConfigToml {
    #[serde(default = "default_desktop_export_dir")]
    pub export_dir: String,
}

impl Default for DesktopMailConfigToml {
    fn default() -> Self {
        Self {
            export_dir: default_desktop_export_dir(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifierConfigToml {
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_notifier_delay_minutes")]
    pub delay_minutes: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_notifier_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Only ever supplied through `OMIS_TELEGRAM_TOKEN`.
    #[serde(skip)]
    pub bot_token: Option<String>,
}

impl Default for NotifierConfigToml {
    fn default() -> Self {
        Self {
            api_url: default_telegram_api_url(),
            chat_id: String::new(),
            delay_minutes: default_notifier_delay_minutes(),
            dry_run: false,
            request_timeout_secs: default_notifier_request_timeout_secs(),
            bot_token: None,
        }
    }
}

impl fmt::Debug for NotifierConfigToml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierConfigToml")
            .field("api_url", &self.api_url)
            .field("chat_id", &self.chat_id)
            .field("delay_minutes", &self.delay_minutes)
            .field("dry_run", &self.dry_run)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebConfigToml {
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
}

impl Default for WebConfigToml {
    fn default() -> Self {
        Self {
            bind_address: default_web_bind_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfigToml {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Empty means stderr.
    #[serde(default)]
    pub file: String,
}

impl Default for LoggingConfigToml {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

impl Default for OmisConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            mail_backend: default_mail_backend(),
            mail: MailConfigToml::default(),
            notifier: NotifierConfigToml::default(),
            web: WebConfigToml::default(),
            logging: LoggingConfigToml::default(),
        }
    }
}

impl OmisConfig {
    pub fn log_file(&self) -> Option<&str> {
        Some(self.logging.file.as_str()).filter(|file| !file.is_empty())
    }

    /// Applies `OMIS_*` overrides on top of the loaded file. Overrides are
    /// never written back to disk.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(path) = env_value(ENV_OMIS_DB_FILE)? {
            self.database_path = path;
        }
        if let Some(backend) = env_value(ENV_OMIS_MAIL_BACKEND)? {
            self.mail_backend = backend;
            normalize_backend_selection(
                &mut self.mail_backend,
                DEFAULT_MAIL_BACKEND,
                ENV_OMIS_MAIL_BACKEND,
                "mail",
            )?;
        }
        if let Some(token) = env_value(ENV_OMIS_TELEGRAM_TOKEN)? {
            self.notifier.bot_token = Some(token);
        }
        if let Some(chat_id) = env_value(ENV_OMIS_TELEGRAM_CHAT_ID)? {
            self.notifier.chat_id = chat_id;
        }
        if let Some(tenant_id) = env_value(ENV_OMIS_OUTLOOK_TENANT_ID)? {
            self.mail.oauth.tenant_id = tenant_id;
        }
        if let Some(client_id) = env_value(ENV_OMIS_OUTLOOK_CLIENT_ID)? {
            self.mail.oauth.client_id = client_id;
        }
        if let Some(secret) = env_value(ENV_OMIS_OUTLOOK_CLIENT_SECRET)? {
            self.mail.oauth.client_secret = Some(secret);
        }
        if let Some(mailbox) = env_value(ENV_OMIS_OUTLOOK_EMAIL)? {
            self.mail.oauth.mailbox = mailbox;
        }
        Ok(())
    }
}

/// Loads the file named by `OMIS_CONFIG` (or the default path) and applies
/// environment overrides.
pub fn load_from_env() -> Result<OmisConfig, ConfigError> {
    let path = config_path_from_env()?;
    let mut config = load_from_path(path)?;
    config.apply_env_overrides()?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<OmisConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME")
    })?;

    Ok(home.join(".config").join("omis").join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match env_value(ENV_OMIS_CONFIG)? {
        Some(raw) => Ok(raw.into()),
        None => default_config_path(),
    }
}

fn env_value(name: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => Ok(Some(raw.trim().to_owned()).filter(|value| !value.is_empty())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::configuration(format!(
            "{name} contained invalid UTF-8"
        ))),
    }
}

/// `$XDG_DATA_HOME/omis`, else `~/.local/share/omis`.
fn default_omis_data_dir() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .filter(|path| path.is_absolute())
        .or_else(|| resolve_home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(std::env::temp_dir)
        .join("omis")
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .filter(|home| !home.as_os_str().is_empty())
}

fn default_database_path() -> String {
    default_omis_data_dir()
        .join("omis.sqlite3")
        .to_string_lossy()
        .to_string()
}

fn default_desktop_export_dir() -> String {
    default_omis_data_dir()
        .join("outlook-export")
        .to_string_lossy()
        .to_string()
}

fn default_mail_backend() -> String {
    DEFAULT_MAIL_BACKEND.to_owned()
}

fn default_mail_message_limit() -> u32 {
    DEFAULT_MAIL_MESSAGE_LIMIT
}

fn default_mail_lookback_minutes() -> u64 {
    DEFAULT_MAIL_LOOKBACK_MINUTES
}

fn default_oauth_authority_url() -> String {
    DEFAULT_OAUTH_AUTHORITY_URL.to_owned()
}

fn default_graph_url() -> String {
    DEFAULT_GRAPH_URL.to_owned()
}

fn default_telegram_api_url() -> String {
    DEFAULT_TELEGRAM_API_URL.to_owned()
}

fn default_notifier_delay_minutes() -> u64 {
    DEFAULT_NOTIFIER_DELAY_MINUTES
}

fn default_notifier_request_timeout_secs() -> u64 {
    DEFAULT_NOTIFIER_REQUEST_TIMEOUT_SECS
}

fn default_web_bind_address() -> String {
    DEFAULT_WEB_BIND_ADDRESS.to_owned()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_owned()
}

fn persist_config(path: &Path, config: &OmisConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize OMIS_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write OMIS_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<OmisConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<OmisConfig>(&raw).map_err(|err| {
            ConfigError::configuration(format!(
                "Failed to parse OMIS_CONFIG from {}: {err}",
                path.display()
            ))
        })?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for OMIS_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }
            let config = OmisConfig::default();
            persist_config(path, &config)?;
            config
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read OMIS_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    if normalize_config(&mut config)? {
        persist_config(path, &config)?;
    }

    Ok(config)
}

fn normalize_config(config: &mut OmisConfig) -> Result<bool, ConfigError> {
    let mut changed = false;

    changed |= normalize_non_empty_string(&mut config.database_path, default_database_path());
    changed |= normalize_backend_selection(
        &mut config.mail_backend,
        DEFAULT_MAIL_BACKEND,
        "mail_backend",
        "mail",
    )?;
    changed |= normalize_mail_config(&mut config.mail);
    changed |= normalize_notifier_config(&mut config.notifier);
    changed |= normalize_non_empty_string(
        &mut config.web.bind_address,
        default_web_bind_address(),
    );
    changed |= normalize_logging_config(&mut config.logging);

    Ok(changed)
}

pub fn normalize_mail_config(config: &mut MailConfigToml) -> bool {
    let mut changed = false;

    let message_limit = config.message_limit.clamp(1, MAX_MAIL_MESSAGE_LIMIT);
    if message_limit != config.message_limit {
        config.message_limit = message_limit;
        changed = true;
    }

    let lookback_minutes = config.lookback_minutes.clamp(1, MAX_MAIL_LOOKBACK_MINUTES);
    if lookback_minutes != config.lookback_minutes {
        config.lookback_minutes = lookback_minutes;
        changed = true;
    }

    changed |= normalize_non_empty_string(
        &mut config.oauth.authority_url,
        default_oauth_authority_url(),
    );
    changed |= normalize_trailing_slash(&mut config.oauth.authority_url);
    changed |= normalize_non_empty_string(&mut config.oauth.graph_url, default_graph_url());
    changed |= normalize_trailing_slash(&mut config.oauth.graph_url);
    changed |= normalize_non_empty_string(&mut config.oauth.tenant_id, String::new());
    changed |= normalize_non_empty_string(&mut config.oauth.client_id, String::new());
    changed |= normalize_non_empty_string(&mut config.oauth.mailbox, String::new());
    changed |= normalize_non_empty_string(
        &mut config.desktop.export_dir,
        default_desktop_export_dir(),
    );

    changed
}

pub fn normalize_notifier_config(config: &mut NotifierConfigToml) -> bool {
    let mut changed = false;

    changed |= normalize_non_empty_string(&mut config.api_url, default_telegram_api_url());
    changed |= normalize_trailing_slash(&mut config.api_url);
    changed |= normalize_non_empty_string(&mut config.chat_id, String::new());

    let delay_minutes = config.delay_minutes.min(MAX_NOTIFIER_DELAY_MINUTES);
    if delay_minutes != config.delay_minutes {
        config.delay_minutes = delay_minutes;
        changed = true;
    }

    let request_timeout_secs = if config.request_timeout_secs == 0 {
        default_notifier_request_timeout_secs()
    } else {
        config
            .request_timeout_secs
            .min(MAX_NOTIFIER_REQUEST_TIMEOUT_SECS)
    };
    if request_timeout_secs != config.request_timeout_secs {
        config.request_timeout_secs = request_timeout_secs;
        changed = true;
    }

    changed
}

fn normalize_logging_config(config: &mut LoggingConfigToml) -> bool {
    let mut changed = false;

    let level = config.level.trim().to_ascii_lowercase();
    let level = if LOG_LEVELS.contains(&level.as_str()) {
        level
    } else {
        default_log_level()
    };
    if level != config.level {
        config.level = level;
        changed = true;
    }
    changed |= normalize_non_empty_string(&mut config.file, String::new());

    changed
}

fn normalize_backend_selection(
    value: &mut String,
    default: &str,
    field_name: &str,
    backend_namespace: &str,
) -> Result<bool, ConfigError> {
    let normalized = value.trim().to_ascii_lowercase();
    let canonical = if normalized.is_empty() {
        default.to_owned()
    } else {
        normalized
    };
    let expected_prefix = format!("{backend_namespace}.");

    let suffix = canonical
        .strip_prefix(expected_prefix.as_str())
        .ok_or_else(|| {
            ConfigError::configuration(format!(
                "Invalid `{field_name}` value '{canonical}': backend keys must be namespaced under `{expected_prefix}*` (for example `{default}`)."
            ))
        })?;
    if suffix.is_empty()
        || !suffix
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
    {
        return Err(ConfigError::configuration(format!(
            "Invalid `{field_name}` value '{canonical}': expected format `{backend_namespace}.<backend_key>` using lowercase letters, digits, `_`, or `-`."
        )));
    }

    if *value != canonical {
        *value = canonical;
        return Ok(true);
    }
    Ok(false)
}

fn normalize_non_empty_string(value: &mut String, default: String) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        if *value != default {
            *value = default;
            return true;
        }
        return false;
    }

    if trimmed != value {
        *value = trimmed.to_owned();
        return true;
    }
    false
}

fn normalize_trailing_slash(value: &mut String) -> bool {
    let trimmed = value.trim_end_matches('/');
    if trimmed.len() != value.len() && !trimmed.is_empty() {
        *value = trimmed.to_owned();
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use omis_core::test_support::with_env_vars;
    use std::time::{SystemTime, UNIX_EPOCH};

    const CLEARED_OVERRIDES: [&str; 8] = [
        ENV_OMIS_DB_FILE,
        ENV_OMIS_MAIL_BACKEND,
        ENV_OMIS_TELEGRAM_TOKEN,
        ENV_OMIS_TELEGRAM_CHAT_ID,
        ENV_OMIS_OUTLOOK_TENANT_ID,
        ENV_OMIS_OUTLOOK_CLIENT_ID,
        ENV_OMIS_OUTLOOK_CLIENT_SECRET,
        ENV_OMIS_OUTLOOK_EMAIL,
    ];

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "omis-config-{prefix}-{nanos}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path).expect("create temp dir");
        path
    }

    fn write_config_file(path: &Path, raw: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture config parent");
        }
        std::fs::write(path, raw.as_bytes()).expect("write fixture config");
    }

    fn base_env<'a>(home: &'a str, extra: &[(&'a str, Option<&'a str>)]) -> Vec<(&'a str, Option<&'a str>)> {
        let mut vars = vec![
            ("HOME", Some(home)),
            ("XDG_DATA_HOME", None),
            (ENV_OMIS_CONFIG, None),
        ];
        vars.extend(CLEARED_OVERRIDES.iter().map(|name| (*name, None)));
        for (name, value) in extra {
            vars.retain(|(existing, _)| existing != name);
            vars.push((*name, *value));
        }
        vars
    }

    #[test]
    fn load_from_env_creates_default_config_when_missing() {
        let home = unique_temp_dir("home-defaults");
        let expected = home.join(".config").join("omis").join("config.toml");
        let home_str = home.to_str().expect("home path").to_owned();

        with_env_vars(&base_env(&home_str, &[]), || {
            let config = load_from_env().expect("load defaults");
            assert_eq!(config.mail_backend, "mail.auto");
            assert_eq!(config.mail.message_limit, 50);
            assert_eq!(config.mail.lookback_minutes, 1_440);
            assert_eq!(config.notifier.delay_minutes, 60);
            assert_eq!(config.web.bind_address, "127.0.0.1:8080");
            assert_eq!(
                Path::new(&config.database_path),
                home.join(".local").join("share").join("omis").join("omis.sqlite3")
            );
            assert!(config.log_file().is_none());
            assert!(expected.exists());
        });

        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn default_data_dir_follows_xdg_data_home() {
        let home = unique_temp_dir("home-xdg");
        let data = unique_temp_dir("xdg-data");
        let home_str = home.to_str().expect("home path").to_owned();
        let data_str = data.to_str().expect("data path").to_owned();

        with_env_vars(
            &base_env(&home_str, &[("XDG_DATA_HOME", Some(data_str.as_str()))]),
            || {
                let config = load_from_env().expect("load defaults");
                assert_eq!(
                    Path::new(&config.database_path),
                    data.join("omis").join("omis.sqlite3")
                );
                assert_eq!(
                    Path::new(&config.mail.desktop.export_dir),
                    data.join("omis").join("outlook-export")
                );
            },
        );

        let _ = std::fs::remove_dir_all(&home);
        let _ = std::fs::remove_dir_all(&data);
    }

    #[test]
    fn load_from_env_honors_explicit_config_path() {
        let home = unique_temp_dir("home-explicit");
        let root = unique_temp_dir("explicit");
        let explicit = root.join("nested").join("custom.toml");
        let default = home.join(".config").join("omis").join("config.toml");
        let home_str = home.to_str().expect("home path").to_owned();
        let explicit_str = explicit.to_str().expect("config path").to_owned();

        with_env_vars(
            &base_env(&home_str, &[(ENV_OMIS_CONFIG, Some(explicit_str.as_str()))]),
            || {
                load_from_env().expect("load explicit config");
                assert!(explicit.exists());
                assert!(!default.exists());
            },
        );

        let _ = std::fs::remove_dir_all(&home);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn load_from_path_clamps_and_persists_normalized_values() {
        let root = unique_temp_dir("normalize");
        let path = root.join("config.toml");
        write_config_file(
            &path,
            r#"
database_path = "  /srv/omis/requests.sqlite3  "
mail_backend = " MAIL.FAKE "

[mail]
message_limit = 0
lookback_minutes = 999999

[mail.oauth]
graph_url = "https://graph.example.test/v1.0/"

[notifier]
api_url = ""
delay_minutes = 1000000000000
request_timeout_secs = 0

[logging]
level = "LOUD"
"#,
        );

        let config = load_from_path(&path).expect("load config");
        assert_eq!(config.database_path, "/srv/omis/requests.sqlite3");
        assert_eq!(config.mail_backend, "mail.fake");
        assert_eq!(config.mail.message_limit, 1);
        assert_eq!(config.mail.lookback_minutes, 43_200);
        assert_eq!(config.mail.oauth.graph_url, "https://graph.example.test/v1.0");
        assert_eq!(config.notifier.api_url, "https://api.telegram.org");
        assert_eq!(config.notifier.request_timeout_secs, 10);
        assert_eq!(config.notifier.delay_minutes, 525_600);
        assert_eq!(config.logging.level, "info");

        let persisted = std::fs::read_to_string(&path).expect("read persisted config");
        assert!(persisted.contains("mail_backend = \"mail.fake\""));
        assert!(persisted.contains("message_limit = 1"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn load_from_path_rejects_unnamespaced_backend_keys() {
        let root = unique_temp_dir("bad-backend");
        let path = root.join("config.toml");
        write_config_file(&path, "mail_backend = \"fake\"\n");

        let error = load_from_path(&path).expect_err("unnamespaced key must be rejected");
        assert!(error.to_string().contains("mail.*"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn env_overrides_apply_without_touching_the_file() {
        let home = unique_temp_dir("home-overrides");
        let home_str = home.to_str().expect("home path").to_owned();

        with_env_vars(
            &base_env(
                &home_str,
                &[
                    (ENV_OMIS_DB_FILE, Some("/tmp/override.sqlite3")),
                    (ENV_OMIS_MAIL_BACKEND, Some("mail.oauth")),
                    (ENV_OMIS_TELEGRAM_TOKEN, Some("123:secret-token")),
                    (ENV_OMIS_TELEGRAM_CHAT_ID, Some("-100200")),
                    (ENV_OMIS_OUTLOOK_TENANT_ID, Some("tenant")),
                    (ENV_OMIS_OUTLOOK_CLIENT_ID, Some("client")),
                    (ENV_OMIS_OUTLOOK_CLIENT_SECRET, Some("client-secret")),
                    (ENV_OMIS_OUTLOOK_EMAIL, Some("ops@example.com")),
                ],
            ),
            || {
                let config = load_from_env().expect("load with overrides");
                assert_eq!(config.database_path, "/tmp/override.sqlite3");
                assert_eq!(config.mail_backend, "mail.oauth");
                assert_eq!(config.notifier.bot_token.as_deref(), Some("123:secret-token"));
                assert_eq!(config.notifier.chat_id, "-100200");
                assert_eq!(config.mail.oauth.tenant_id, "tenant");
                assert_eq!(config.mail.oauth.client_id, "client");
                assert_eq!(config.mail.oauth.mailbox, "ops@example.com");
                assert_eq!(
                    config.mail.oauth.client_secret.as_deref(),
                    Some("client-secret")
                );

                let persisted = std::fs::read_to_string(
                    home.join(".config").join("omis").join("config.toml"),
                )
                .expect("read persisted config");
                assert!(!persisted.contains("secret"));
                assert!(!persisted.contains("override.sqlite3"));
            },
        );

        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = OmisConfig::default();
        config.notifier.bot_token = Some("123:bot-token".to_owned());
        config.mail.oauth.client_secret = Some("graph-secret".to_owned());

        let debug = format!("{config:?}");
        assert!(!debug.contains("bot-token"));
        assert!(!debug.contains("graph-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
