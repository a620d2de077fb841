//! Service configuration.
//!
//! Configuration is read from a JSON file (path from `NOTIHUB_CONFIG`) with
//! every section defaulted, then overridden from the environment. `.env`
//! files are honoured via `dotenvy`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::notification::channels::ChannelConfig;
use crate::{Error, Result};

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "NOTIHUB_CONFIG";

/// Environment variable overriding the database URL.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:notihub.db?mode=rwc";

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "notihub=info,sqlx=warn";

/// Longest accepted dedup window (30 days).
pub const MAX_DEDUP_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Longest accepted delay between retries (1 hour).
pub const MAX_BACKOFF_SECS: f64 = 3600.0;

/// Deduplication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    /// Dedup window in seconds.
    #[serde(alias = "ttl")]
    pub ttl_secs: u64,
    /// Maximum number of dedup marks held in memory.
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 60,
            max_entries: 1000,
        }
    }
}

/// Retry settings applied to every channel send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    /// Delay in seconds before each retry, indexed by attempt.
    #[serde(alias = "backoff")]
    pub backoff_secs: Vec<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff_secs: vec![1.0, 4.0, 10.0],
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub dedup: DedupConfig,
    pub retry: RetryConfig,
    /// Channels in dispatch order.
    pub channels: Vec<ChannelConfig>,
    pub database_url: String,
    pub log_filter: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            dedup: DedupConfig::default(),
            retry: RetryConfig::default(),
            channels: Vec::new(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl NotifyConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&content)?;
        info!(
            "Loaded configuration from {} ({} channels)",
            path.display(),
            config.channels.len()
        );
        Ok(config)
    }

    /// Load from `NOTIHUB_CONFIG` (defaults when unset) and apply environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None)
    }

    /// Like [`Self::from_env`], but an explicit `path` takes precedence over
    /// `NOTIHUB_CONFIG`.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(Into::into));
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                debug!("{} not set, using default configuration", CONFIG_PATH_ENV);
                Self::default()
            }
        };

        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.dedup.enabled && self.dedup.ttl_secs == 0 {
            return Err(Error::config("dedup.ttl_secs must be at least 1"));
        }
        if self.dedup.ttl_secs > MAX_DEDUP_TTL_SECS {
            return Err(Error::config(format!(
                "dedup.ttl_secs must be at most {}",
                MAX_DEDUP_TTL_SECS
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if let Some(bad) = self
            .retry
            .backoff_secs
            .iter()
            .find(|s| !(0.0..=MAX_BACKOFF_SECS).contains(*s))
        {
            return Err(Error::config(format!(
                "retry.backoff_secs contains invalid delay {}",
                bad
            )));
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name().trim().is_empty() {
                return Err(Error::config("channel name must not be empty"));
            }
            if !names.insert(channel.name()) {
                return Err(Error::config(format!(
                    "duplicate channel name: {}",
                    channel.name()
                )));
            }
        }

        Ok(())
    }
}
