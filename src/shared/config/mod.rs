//! Realtime configuration module
//!
//! [`RealtimeConfig`] holds every tunable of the propagation layer. It is
//! assembled from defaults, an optional TOML file and environment
//! variables (later sources win) and validated before use.
//!
//! # Environment variables
//!
//! | Variable | Field |
//! |---|---|
//! | `DATABASE_URL` | `database_url` |
//! | `XFPULSE_POLL_INTERVAL_MS` | `poll_interval` |
//! | `XFPULSE_RECONNECT_DELAY_MS` | `reconnect_delay` |
//! | `XFPULSE_MAX_RECONNECT_DELAY_MS` | `max_reconnect_delay` |
//! | `XFPULSE_RECEIVE_TIMEOUT_MS` | `receive_timeout` |
//! | `XFPULSE_LIVENESS_INTERVAL_MS` | `liveness_interval` |
//! | `XFPULSE_INITIAL_LOAD_LIMIT` | `initial_load_limit` |
//! | `XFPULSE_PUBLISH_MODE` | `publish_mode` (`application` or `trigger`) |
//!
//! The TOML file is read from `XFPULSE_CONFIG` when set, otherwise from
//! `<config dir>/xfpulse/realtime.toml` if it exists.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default poll interval for reconciliation ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);
/// Default first reconnect delay
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// Default reconnect delay cap
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// Default bound on a single transport wait
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);
/// Default spacing of liveness probes
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(30);
/// Default number of records in a view's initial load
pub const DEFAULT_INITIAL_LOAD_LIMIT: i64 = 100;

/// How a write announces itself on the push path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// The application publishes after the write commits
    #[default]
    Application,
    /// A store trigger publishes inside the write's transaction
    Trigger,
}

impl FromStr for PublishMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "application" | "app" => Ok(Self::Application),
            "trigger" => Ok(Self::Trigger),
            _ => Err(ConfigError::InvalidValue(
                "publish_mode",
                format!("expected 'application' or 'trigger', got '{}'", s),
            )),
        }
    }
}

/// Realtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// PostgreSQL connection string
    pub database_url: Option<String>,
    /// Interval between reconciliation ticks of a view
    pub poll_interval: Duration,
    /// First delay before a reconnection attempt
    pub reconnect_delay: Duration,
    /// Upper bound for the reconnect backoff
    pub max_reconnect_delay: Duration,
    /// Bound on a single wait for a push payload
    pub receive_timeout: Duration,
    /// Spacing of liveness probes on an idle connection
    pub liveness_interval: Duration,
    /// Number of newest records loaded when a view opens
    pub initial_load_limit: i64,
    /// Push path used by the write side
    pub publish_mode: PublishMode,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            initial_load_limit: DEFAULT_INITIAL_LOAD_LIMIT,
            publish_mode: PublishMode::default(),
        }
    }
}

impl RealtimeConfig {
    /// Create a new RealtimeConfigBuilder
    pub fn builder() -> RealtimeConfigBuilder {
        RealtimeConfigBuilder::default()
    }

    /// Load defaults, then the config file, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Some(path) = config_file_path() {
            builder = builder.merge_file(&path)?;
        }
        builder.merge_env()?.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("poll_interval", self.poll_interval),
            ("reconnect_delay", self.reconnect_delay),
            ("receive_timeout", self.receive_timeout),
            ("liveness_interval", self.liveness_interval),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(name, "must be greater than zero".into()));
            }
        }
        if self.max_reconnect_delay < self.reconnect_delay {
            return Err(ConfigError::InvalidValue(
                "max_reconnect_delay",
                "must not be below reconnect_delay".into(),
            ));
        }
        if self.initial_load_limit <= 0 {
            return Err(ConfigError::InvalidValue(
                "initial_load_limit",
                "must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The database URL, required by the Postgres transport and store
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingValue("DATABASE_URL"))
    }
}

/// Config file shape; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    database_url: Option<String>,
    poll_interval_ms: Option<u64>,
    reconnect_delay_ms: Option<u64>,
    max_reconnect_delay_ms: Option<u64>,
    receive_timeout_ms: Option<u64>,
    liveness_interval_ms: Option<u64>,
    initial_load_limit: Option<i64>,
    publish_mode: Option<PublishMode>,
}

/// Builder for RealtimeConfig
#[derive(Debug, Default)]
pub struct RealtimeConfigBuilder {
    config: RealtimeConfig,
}

impl RealtimeConfigBuilder {
    /// Set the database URL
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the first reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Set the reconnect delay cap
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.max_reconnect_delay = delay;
        self
    }

    /// Set the receive timeout
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.config.receive_timeout = timeout;
        self
    }

    /// Set the liveness probe interval
    pub fn liveness_interval(mut self, interval: Duration) -> Self {
        self.config.liveness_interval = interval;
        self
    }

    /// Set the initial load size
    pub fn initial_load_limit(mut self, limit: i64) -> Self {
        self.config.initial_load_limit = limit;
        self
    }

    /// Set the publish mode
    pub fn publish_mode(mut self, mode: PublishMode) -> Self {
        self.config.publish_mode = mode;
        self
    }

    /// Apply values from a TOML file
    pub fn merge_file(self, path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(path.to_path_buf(), e.to_string()))?;
        self.merge_toml(&raw)
            .map_err(|e| ConfigError::File(path.to_path_buf(), e.to_string()))
    }

    /// Apply values from a TOML document
    pub fn merge_toml(mut self, raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let c = &mut self.config;
        if let Some(url) = file.database_url {
            c.database_url = Some(url);
        }
        if let Some(ms) = file.poll_interval_ms {
            c.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.reconnect_delay_ms {
            c.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.max_reconnect_delay_ms {
            c.max_reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.receive_timeout_ms {
            c.receive_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.liveness_interval_ms {
            c.liveness_interval = Duration::from_millis(ms);
        }
        if let Some(limit) = file.initial_load_limit {
            c.initial_load_limit = limit;
        }
        if let Some(mode) = file.publish_mode {
            c.publish_mode = mode;
        }
        Ok(self)
    }

    /// Apply values from the process environment
    pub fn merge_env(self) -> Result<Self, ConfigError> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply values from an arbitrary variable lookup
    pub fn merge_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &'static str| -> Result<Option<Duration>, ConfigError> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|_| ConfigError::InvalidValue(key, format!("expected milliseconds, got '{}'", v)))
                })
                .transpose()
        };

        let c = &mut self.config;
        if let Some(url) = lookup("DATABASE_URL") {
            c.database_url = Some(url);
        }
        if let Some(d) = millis("XFPULSE_POLL_INTERVAL_MS")? {
            c.poll_interval = d;
        }
        if let Some(d) = millis("XFPULSE_RECONNECT_DELAY_MS")? {
            c.reconnect_delay = d;
        }
        if let Some(d) = millis("XFPULSE_MAX_RECONNECT_DELAY_MS")? {
            c.max_reconnect_delay = d;
        }
        if let Some(d) = millis("XFPULSE_RECEIVE_TIMEOUT_MS")? {
            c.receive_timeout = d;
        }
        if let Some(d) = millis("XFPULSE_LIVENESS_INTERVAL_MS")? {
            c.liveness_interval = d;
        }
        if let Some(v) = lookup("XFPULSE_INITIAL_LOAD_LIMIT") {
            c.initial_load_limit = v.trim().parse().map_err(|_| {
                ConfigError::InvalidValue("XFPULSE_INITIAL_LOAD_LIMIT", format!("expected integer, got '{}'", v))
            })?;
        }
        if let Some(v) = lookup("XFPULSE_PUBLISH_MODE") {
            c.publish_mode = v.parse()?;
        }
        Ok(self)
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<RealtimeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Location of the optional config file
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XFPULSE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("xfpulse").join("realtime.toml"))
        .filter(|path| path.exists())
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("config file {0}: {1}")]
    File(PathBuf, String),
}
