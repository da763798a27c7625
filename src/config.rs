use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::API_BASE;
use crate::engine::ENDING_SOON_MINS;
use crate::notifier::DEFAULT_POLL_INTERVAL;

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Environment variable overriding `api.api_key`.
pub const API_KEY_VAR: &str = "NOROFF_API_KEY";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Auction API endpoint and key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Polling interval in seconds for watched listings.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Minutes before close at which "ending soon" fires.
    #[serde(default = "default_ending_soon")]
    pub ending_soon_mins: i64,
    /// JSON file backing the local key-value store.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

fn default_base_url() -> String {
    API_BASE.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_ending_soon() -> i64 {
    ENDING_SOON_MINS
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("auction-watch.json")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            ending_soon_mins: default_ending_soon(),
            storage_path: default_storage_path(),
        }
    }
}

impl SettingsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn ending_soon_window(&self) -> TimeDelta {
        TimeDelta::try_minutes(self.ending_soon_mins.max(0))
            .unwrap_or_else(|| TimeDelta::minutes(ENDING_SOON_MINS))
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load config if the file exists, otherwise defaults. The API key can
    /// be supplied or overridden through [`API_KEY_VAR`].
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        if let Ok(key) = std::env::var(API_KEY_VAR) {
            if !key.is_empty() {
                config.api.api_key = Some(key);
            }
        }
        Ok(config)
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
