use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 900;

/// Connection settings for one meter.
///
/// A record is never edited in place; applying options yields a new record and
/// the integration is set up again from it.
#[derive(Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(
        default = "empty_secret",
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub password: SecretString,
    /// Seconds between polls.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    #[serde(default = "default_ignore_tls_errors")]
    pub ignore_tls_errors: bool,
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_ignore_tls_errors() -> bool {
    true
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

// The record is persisted so the password has to round-trip through the file.
fn serialize_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn deserialize_secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

impl fmt::Debug for MeterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("scan_interval", &self.scan_interval)
            .field("ignore_tls_errors", &self.ignore_tls_errors)
            .finish()
    }
}

impl MeterConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            scan_interval: DEFAULT_SCAN_INTERVAL_SECS,
            ignore_tls_errors: true,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.scan_interval == 0 {
            return Err(ConfigError::Invalid(
                "scan_interval must be at least 1 second".into(),
            ));
        }
        Ok(())
    }

    /// Reads the record from `GARO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("GARO_HOST").map_err(|_| ConfigError::Missing("GARO_HOST"))?;
        let mut config = Self::new(
            host,
            env::var("GARO_USERNAME").unwrap_or_default(),
            env::var("GARO_PASSWORD").unwrap_or_default(),
        );
        if let Ok(raw) = env::var("GARO_SCAN_INTERVAL") {
            config.scan_interval = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("GARO_SCAN_INTERVAL is not a number: {raw}"))
            })?;
        }
        config.ignore_tls_errors = parse_bool_or(
            env::var("GARO_IGNORE_TLS_ERRORS").ok(),
            default_ignore_tls_errors(),
        );
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Returns a new record with every set option taking precedence.
    pub fn with_options(&self, options: &MeterOptions) -> Self {
        let mut config = self.clone();
        if let Some(scan_interval) = options.scan_interval {
            config.scan_interval = scan_interval;
        }
        if let Some(ignore_tls_errors) = options.ignore_tls_errors {
            config.ignore_tls_errors = ignore_tls_errors;
        }
        if let Some(username) = &options.username {
            config.username = username.clone();
        }
        if let Some(password) = &options.password {
            config.password = SecretString::from(password.clone());
        }
        config
    }
}

/// User-editable overrides for a stored [`MeterConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterOptions {
    #[serde(default)]
    pub scan_interval: Option<u64>,
    #[serde(default)]
    pub ignore_tls_errors: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Parses a boolean case-insensitively, falling back to `default` when unset or invalid
fn parse_bool_or(val: Option<String>, default: bool) -> bool {
    val.and_then(|v| v.trim().to_ascii_lowercase().parse().ok())
        .unwrap_or(default)
}
