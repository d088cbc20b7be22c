//! Process-wide client settings
//!
//! The backend base URL is read once from `BACKEND_URL` when first requested
//! and shared for the rest of the process.

use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable holding the backend base URL
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

/// Base URL used when the environment does not provide one
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";

/// Default delay between two job status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of status polls before a job is considered timed out
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

/// Default cadence of the simulated progress timers
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

static GLOBAL_SETTINGS: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid backend URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },
}

/// Client settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the compression service, without a trailing path
    pub base_url: Url,
    /// Delay between two status polls of one job
    pub poll_interval: Duration,
    /// Poll ceiling per job
    pub max_poll_attempts: u32,
    /// Cadence of simulated progress timers
    pub tick_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is valid"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl Settings {
    /// Build settings for the given base URL, other values at their defaults
    pub fn with_base_url(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            ..Self::default()
        })
    }

    /// Resolve settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(BACKEND_URL_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::with_base_url(value.trim()),
            _ => Ok(Self::default()),
        }
    }

    /// Settings resolved once per process.
    ///
    /// An invalid `BACKEND_URL` is logged and replaced by the loopback default.
    pub fn global() -> &'static Settings {
        GLOBAL_SETTINGS.get_or_init(|| match Self::from_env() {
            Ok(settings) => {
                tracing::info!(target: "config", base_url = %settings.base_url, "Backend URL resolved");
                settings
            }
            Err(e) => {
                tracing::warn!(target: "config", error = %e, "Falling back to default backend URL");
                Self::default()
            }
        })
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidBaseUrl {
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(url)
}
