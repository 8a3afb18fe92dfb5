//! Refresh job configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) gives
//! the standard daily refresh. The CLI overrides individual fields on top.

use crate::feed::etherscan::{DEFAULT_FEED_URL, DEFAULT_USER_AGENT};
use crate::feed::sink::DEFAULT_OUTPUT_PATH;
use crate::feed::WindowStart;
use crate::runner::RunSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
    pub url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub output_path: PathBuf,
    /// Defaults to `{output_path}.status.json` when unset.
    pub status_path: Option<PathBuf>,
    pub write_status: bool,
    pub window: WindowStart,
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry. 0 disables.
    pub retry_delay_ms: u64,
    /// Upper bound on any single wait between attempts.
    pub max_retry_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            status_path: None,
            write_status: true,
            window: WindowStart::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: 500,
            max_retry_delay_ms: 60_000,
        }
    }
}

impl RefreshConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Where the run status sidecar goes, or None when disabled.
    pub fn resolved_status_path(&self) -> Option<PathBuf> {
        if !self.write_status {
            return None;
        }
        Some(self.status_path.clone().unwrap_or_else(|| {
            let mut name = self.output_path.as_os_str().to_owned();
            name.push(".status.json");
            PathBuf::from(name)
        }))
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            window: self.window,
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
        }
    }
}
