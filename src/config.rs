use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Directory for the table files and logs. Defaults to `./data`.
    data_dir: Option<String>,
    /// IANA timezone used for timestamps and due dates.
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_http_timeout_secs")]
    http_timeout_secs: u64,
    #[serde(default)]
    twilio: TwilioSection,
    #[serde(default)]
    openai: OpenAiSection,
    #[serde(default)]
    translation: TranslationSection,
}

#[derive(Deserialize, Default)]
struct TwilioSection {
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiSection {
    api_key: Option<String>,
    model: Option<String>,
}

/// LibreTranslate-compatible endpoint.
#[derive(Deserialize, Default)]
struct TranslationSection {
    endpoint: Option<String>,
    api_key: Option<String>,
}

fn default_timezone() -> String {
    "Africa/Nairobi".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_http_timeout_secs() -> u64 {
    10
}

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
}

/// Which optional services are usable, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub messaging: bool,
    pub language_model: bool,
    pub translation: bool,
}

pub struct Config {
    pub data_dir: PathBuf,
    pub timezone: Tz,
    /// Sends per outbox entry before it is left for manual handling.
    pub max_attempts: u32,
    /// Timeout applied to every provider HTTP call.
    pub http_timeout: Duration,
    pub twilio: Option<TwilioCredentials>,
    pub openai: Option<OpenAiSettings>,
    pub translation: Option<TranslationSettings>,
}

impl Config {
    /// Load from `path`, falling back to process environment for credentials.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load from `path`; credentials missing from the file are looked up with `env`.
    ///
    /// A missing file is not an error: every setting takes its default.
    pub fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = if config_path.exists() {
            std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?
        } else {
            info!("No config file at {}, using defaults", config_path.display());
            "{}".to_string()
        };
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.max_attempts == 0 {
            return Err(ConfigError::Validation("max_attempts must be at least 1".into()));
        }
        if file.http_timeout_secs == 0 {
            return Err(ConfigError::Validation("http_timeout_secs must be at least 1".into()));
        }
        let timezone: Tz = file.timezone.parse().map_err(|e| {
            ConfigError::Validation(format!("unknown timezone '{}': {}", file.timezone, e))
        })?;

        let env = |key: &str| present(env(key));

        let twilio = resolve_twilio(file.twilio, &env);

        let openai = match present(file.openai.api_key) {
            Some(api_key) => Some(OpenAiSettings {
                api_key,
                model: present(file.openai.model).unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            }),
            None => env("OPENAI_API_KEY").map(|api_key| OpenAiSettings {
                api_key,
                model: env("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            }),
        };

        let translation = match present(file.translation.endpoint) {
            Some(endpoint) => Some(TranslationSettings {
                endpoint,
                api_key: present(file.translation.api_key),
            }),
            None => env("TRANSLATE_ENDPOINT").map(|endpoint| TranslationSettings {
                endpoint,
                api_key: env("TRANSLATE_API_KEY"),
            }),
        };

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        Ok(Self {
            data_dir,
            timezone,
            max_attempts: file.max_attempts,
            http_timeout: Duration::from_secs(file.http_timeout_secs),
            twilio,
            openai,
            translation,
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The file section wins only when it carries all three values; otherwise all
/// three must come from the environment.
fn resolve_twilio(
    section: TwilioSection,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<TwilioCredentials> {
    if let (Some(account_sid), Some(auth_token), Some(from_number)) = (
        present(section.account_sid),
        present(section.auth_token),
        present(section.from_number),
    ) {
        return Some(TwilioCredentials { account_sid, auth_token, from_number });
    }
    Some(TwilioCredentials {
        account_sid: env("TWILIO_ACCOUNT_SID")?,
        auth_token: env("TWILIO_AUTH_TOKEN")?,
        from_number: env("TWILIO_PHONE_NUMBER")?,
    })
}
