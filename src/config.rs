use directories::ProjectDirs;
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{Result, VahtiError};

/// Minimum poll interval. The search API is rate-sensitive; shorter intervals
/// are clamped up to this.
pub const MIN_POLL_INTERVAL_SECS: u64 = 300;

fn default_poll_interval() -> u64 {
    MIN_POLL_INTERVAL_SECS
}

/// Global torivahti configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bot API token. May also come from TORIVAHTI_BOT_TOKEN.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Poll interval in seconds (clamped to MIN_POLL_INTERVAL_SECS).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Directory holding the per-locale reference data
    /// (categories/, locations/, messages/). Defaults to ./data.
    #[serde(default)]
    pub reference_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            poll_interval_secs: default_poll_interval(),
            reference_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path, falling back to defaults if
    /// the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Bot token from config or environment, in that order.
    pub fn bot_token(&self) -> Result<String> {
        if let Some(ref token) = self.bot_token {
            return Ok(token.clone());
        }
        std::env::var("TORIVAHTI_BOT_TOKEN").map_err(|_| {
            VahtiError::ConfigError(
                "No bot token: set bot_token in config.toml or TORIVAHTI_BOT_TOKEN".into(),
            )
        })
    }

    /// Effective poll interval, never below the rate-safety floor.
    pub fn poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS)
    }

    /// Directory with the per-locale reference data.
    pub fn reference_dir(&self) -> PathBuf {
        self.reference_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "torivahti")
            .ok_or_else(|| VahtiError::ConfigError("Could not determine config directory".into()))?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "torivahti")
            .ok_or_else(|| VahtiError::ConfigError("Could not determine data directory".into()))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the database path
    ///
    /// Supports TORIVAHTI_DB environment variable for test isolation
    pub fn db_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("TORIVAHTI_DB") {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::data_dir()?.join("torivahti.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval_secs(), 300);
        assert!(config.bot_token.is_none());
    }

    #[test]
    fn test_interval_is_clamped_to_floor() {
        let config: Config = toml::from_str("poll_interval_secs = 30").unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.poll_interval_secs(), 300);

        let config: Config = toml::from_str("poll_interval_secs = 600").unwrap();
        assert_eq!(config.poll_interval_secs(), 600);
    }
}
