//! Configuration loading and resolution
//!
//! Every setting is resolved in priority order:
//! 1. Command-line argument (applied by the binary on top of the result)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! Missing config files are not fatal: the loader logs a warning and
//! continues with defaults. Missing *credentials* are only reported by the
//! component that needs them, right before it would use them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEFAULT_OPENFDA_URL: &str = "https://api.fda.gov/food/enforcement.json";
pub const DEFAULT_FETCH_LIMIT: u32 = 10;
pub const DEFAULT_SORT_FIELD: &str = "report_date";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://recalls.db?mode=rwc";
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 465;
pub const DEFAULT_LOG_LEVEL: &str = "info";

const CONFIG_DIR_NAME: &str = "recall-alert";

// ============================================================================
// TOML file layout
// ============================================================================

/// On-disk configuration file. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub summarizer: SummarizerSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub smtp: SmtpSection,
    #[serde(default)]
    pub sms: SmsSection,
    #[serde(default)]
    pub notify: NotifySection,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSection {
    pub url: Option<String>,
    pub limit: Option<u32>,
    pub sort_field: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizerSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    pub backend: Option<String>,
    pub database_url: Option<String>,
    pub firebase_credentials: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmsSection {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifySection {
    pub allow_send: Option<bool>,
    pub channel: Option<String>,
    pub to: Option<String>,
    pub carrier_domain: Option<String>,
    pub test_email: Option<String>,
}

/// Load the TOML config file
///
/// An explicit path must exist. Without one, the platform locations are
/// tried and a missing file yields the default (empty) config.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_file() {
            Some(path) => path,
            None => {
                debug!("No config file found, using environment and defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    debug!("Loaded config file: {}", path.display());
    Ok(config)
}

/// First existing config file in the platform search order
///
/// Linux also checks /etc after the per-user directory.
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(CONFIG_DIR_NAME).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    /// Local SQLite table
    Sqlite,
    /// Cloud Firestore collection
    Firestore,
}

impl FromStr for StoreBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" | "relational" => Ok(StoreBackendKind::Sqlite),
            "firestore" | "firebase" | "document" => Ok(StoreBackendKind::Firestore),
            other => Err(Error::Config(format!(
                "Unknown store backend '{}' (expected sqlite or firestore)",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackendKind::Sqlite => f.write_str("sqlite"),
            StoreBackendKind::Firestore => f.write_str("firestore"),
        }
    }
}

/// Notification channel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Email,
    SmsApi,
    SmsGateway,
}

impl FromStr for ChannelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "email" | "smtp" => Ok(ChannelKind::Email),
            "sms_api" | "sms" | "twilio" => Ok(ChannelKind::SmsApi),
            "sms_gateway" | "gateway" => Ok(ChannelKind::SmsGateway),
            other => Err(Error::Config(format!(
                "Unknown notification channel '{}' (expected email, sms_api or sms_gateway)",
                other
            ))),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Email => f.write_str("email"),
            ChannelKind::SmsApi => f.write_str("sms_api"),
            ChannelKind::SmsGateway => f.write_str("sms_gateway"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub limit: u32,
    pub sort_field: String,
}

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    pub database_url: String,
    pub firebase_credentials: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// false means dry-run
    pub allow_send: bool,
    pub channel: ChannelKind,
    pub to: Option<String>,
    pub carrier_domain: Option<String>,
    pub test_email: Option<String>,
}

/// Fully resolved configuration for one process
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub source: SourceConfig,
    pub summarizer: SummarizerConfig,
    pub store: StoreConfig,
    pub smtp: SmtpConfig,
    pub sms: SmsConfig,
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// Resolve from the process environment over the given TOML config
    pub fn resolve(toml: &TomlConfig) -> Result<Self> {
        Self::resolve_with(toml, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit variable lookup
    pub fn resolve_with<F>(toml: &TomlConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset
        let env = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let limit = match env("FETCH_LIMIT") {
            Some(raw) => parse_number::<u32>("FETCH_LIMIT", &raw)?,
            None => toml.source.limit.unwrap_or(DEFAULT_FETCH_LIMIT),
        };

        let backend = match env("STORE_BACKEND").or_else(|| toml.store.backend.clone()) {
            Some(raw) => raw.parse()?,
            None => StoreBackendKind::Sqlite,
        };

        let port = match env("SMTP_PORT") {
            Some(raw) => parse_number::<u16>("SMTP_PORT", &raw)?,
            None => toml.smtp.port.unwrap_or(DEFAULT_SMTP_PORT),
        };

        let allow_send = match env("ALLOW_SEND") {
            Some(raw) => parse_bool("ALLOW_SEND", &raw)?,
            None => toml.notify.allow_send.unwrap_or(false),
        };

        let channel = match env("NOTIFY_CHANNEL").or_else(|| toml.notify.channel.clone()) {
            Some(raw) => raw.parse()?,
            None => ChannelKind::Email,
        };

        let config = Self {
            log_level: env("RECALL_LOG_LEVEL")
                .or_else(|| toml.logging.level.clone())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            source: SourceConfig {
                url: env("OPENFDA_URL")
                    .or_else(|| toml.source.url.clone())
                    .unwrap_or_else(|| DEFAULT_OPENFDA_URL.to_string()),
                limit,
                sort_field: env("FETCH_SORT_FIELD")
                    .or_else(|| toml.source.sort_field.clone())
                    .unwrap_or_else(|| DEFAULT_SORT_FIELD.to_string()),
            },
            summarizer: SummarizerConfig {
                api_key: env("GEMINI_API_KEY").or_else(|| toml.summarizer.api_key.clone()),
                model: env("GEMINI_MODEL")
                    .or_else(|| toml.summarizer.model.clone())
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            },
            store: StoreConfig {
                backend,
                database_url: env("DATABASE_URL")
                    .or_else(|| toml.store.database_url.clone())
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                firebase_credentials: env("FIREBASE_CREDENTIALS")
                    .map(PathBuf::from)
                    .or_else(|| toml.store.firebase_credentials.clone()),
            },
            smtp: SmtpConfig {
                host: env("SMTP_HOST")
                    .or_else(|| toml.smtp.host.clone())
                    .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                port,
                user: env("SMTP_USER").or_else(|| toml.smtp.user.clone()),
                password: env("SMTP_PASS").or_else(|| toml.smtp.password.clone()),
                from: env("SMTP_FROM").or_else(|| toml.smtp.from.clone()),
            },
            sms: SmsConfig {
                account_sid: env("TWILIO_ACCOUNT_SID").or_else(|| toml.sms.account_sid.clone()),
                auth_token: env("TWILIO_AUTH_TOKEN").or_else(|| toml.sms.auth_token.clone()),
                from_number: env("TWILIO_FROM_NUMBER").or_else(|| toml.sms.from_number.clone()),
            },
            notify: NotifyConfig {
                allow_send,
                channel,
                to: env("NOTIFY_TO").or_else(|| toml.notify.to.clone()),
                carrier_domain: env("SMS_CARRIER_DOMAIN")
                    .or_else(|| toml.notify.carrier_domain.clone()),
                test_email: env("TEST_EMAIL").or_else(|| toml.notify.test_email.clone()),
            },
        };

        if config.source.limit == 0 {
            warn!("FETCH_LIMIT is 0, polls will not fetch any records");
        }

        Ok(config)
    }

    /// true unless ALLOW_SEND was explicitly enabled
    pub fn dry_run(&self) -> bool {
        !self.notify.allow_send
    }

    /// Destination used when none is given on the command line
    ///
    /// NOTIFY_TO, then TEST_EMAIL, then the SMTP user itself.
    pub fn default_destination(&self) -> Option<String> {
        self.notify
            .to
            .clone()
            .or_else(|| self.notify.test_email.clone())
            .or_else(|| self.smtp.user.clone())
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| Error::Config(format!("{} must be a number ({}): {}", key, raw, e)))
}

/// Accepts 1/0, true/false, yes/no, on/off
pub fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
