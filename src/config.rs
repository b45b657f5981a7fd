//! Configuration types.
//!
//! Everything is read from the environment. Each `from_env()` delegates to a
//! `from_lookup()` that takes the variable source as a closure, so tests can
//! feed a map instead of touching process state.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default poll interval: 5 minutes.
const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 5;

/// Longest accepted poll interval: one week.
const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Upper bound on `PollConfig::interval`.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(MAX_POLL_INTERVAL_MINUTES * 60);

/// Default timeout for a single opt-out call.
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;

/// Default timeout for the provider fetch.
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Inbound SMS provider credentials and endpoint.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub username: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: required(&lookup, "SMS_PROVIDER_BASE_URL")?,
            username: required(&lookup, "SMS_PROVIDER_USERNAME")?,
            api_key: SecretString::from(required(&lookup, "SMS_PROVIDER_API_KEY")?),
            timeout: Duration::from_secs(parsed(
                &lookup,
                "SMS_PROVIDER_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT_SECS,
            )?),
        })
    }
}

/// Opt-out backend endpoint.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL; `/opt-out-alert` is appended.
    pub base_url: String,
    /// Upper bound on a single opt-out call.
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: required(&lookup, "OPT_OUT_BACKEND_URL")?,
            timeout: Duration::from_secs(parsed(
                &lookup,
                "OPT_OUT_BACKEND_TIMEOUT_SECS",
                DEFAULT_BACKEND_TIMEOUT_SECS,
            )?),
        })
    }
}

/// What a run does when the opt-out backend fails for one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendFailurePolicy {
    /// Stop the run and surface the error. Remaining messages wait for the next tick.
    #[default]
    Abort,
    /// Log the failure, leave the message un-ledgered and keep going.
    Continue,
}

impl FromStr for BackendFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(format!("expected 'abort' or 'continue', got '{other}'")),
        }
    }
}

/// Poll scheduler settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub on_backend_failure: BackendFailurePolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_MINUTES * 60),
            on_backend_failure: BackendFailurePolicy::Abort,
        }
    }
}

impl PollConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let enabled = match lookup("SMS_REPLY_POLL_ENABLED") {
            Some(v) => parse_bool(&v).ok_or_else(|| ConfigError::InvalidValue {
                key: "SMS_REPLY_POLL_ENABLED".into(),
                message: format!("expected a boolean, got '{v}'"),
            })?,
            None => true,
        };

        let minutes: u64 = parsed(
            &lookup,
            "SMS_REPLY_POLL_INTERVAL_MINUTES",
            DEFAULT_POLL_INTERVAL_MINUTES,
        )?;
        if !(1..=MAX_POLL_INTERVAL_MINUTES).contains(&minutes) {
            return Err(ConfigError::InvalidValue {
                key: "SMS_REPLY_POLL_INTERVAL_MINUTES".into(),
                message: format!("must be between 1 and {MAX_POLL_INTERVAL_MINUTES}"),
            });
        }

        let on_backend_failure = parsed(
            &lookup,
            "SMS_REPLY_ON_BACKEND_FAILURE",
            BackendFailurePolicy::Abort,
        )?;

        Ok(Self {
            enabled,
            interval: Duration::from_secs(minutes * 60),
            on_backend_failure,
        })
    }
}

/// Process-level settings: database file, HTTP port, log directory.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub log_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            db_path: lookup("SMS_OPTOUT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/sms-optout.db")),
            port: parsed(&lookup, "SMS_OPTOUT_PORT", 8080)?,
            log_dir: lookup("SMS_OPTOUT_LOG_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub backend: BackendConfig,
    pub poll: PollConfig,
    pub service: ServiceConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            provider: ProviderConfig::from_lookup(&lookup)?,
            backend: BackendConfig::from_lookup(&lookup)?,
            poll: PollConfig::from_lookup(&lookup)?,
            service: ServiceConfig::from_lookup(&lookup)?,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
