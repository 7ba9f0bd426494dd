use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.toml";
const API_URL_ENV: &str = "TOWNHALL_API_URL";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub video: VideoConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub meetings: MeetingsConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend JSON API
    pub base_url: String,
    /// Timeout for list/load requests, after which local data is served
    pub read_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            read_timeout_secs: 5,
        }
    }
}

impl ApiConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Embedded video widget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Base URL of the video service; join URLs are built from it
    pub base_url: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sfu.mirotalk.com".to_string(),
        }
    }
}

/// Durable fallback storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory (empty = default data dir)
    pub data_dir: Option<String>,
}

/// Poll synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Keep polls that never reached the backend when a fresh list arrives
    pub keep_unsynced_polls: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            keep_unsynced_polls: true,
        }
    }
}

/// Meeting scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingsConfig {
    /// Minutes before the scheduled date from which a meeting can be joined
    pub join_window_minutes: i64,
}

impl Default for MeetingsConfig {
    fn default() -> Self {
        Self {
            join_window_minutes: 10,
        }
    }
}

impl MeetingsConfig {
    pub fn join_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.join_window_minutes)
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("townhall");

        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from file, or create default if not exists.
    /// `TOWNHALL_API_URL` overrides the backend URL either way.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .context("Failed to read config file")?;

            toml::from_str(&contents)
                .context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env(std::env::var(API_URL_ENV).ok());
        Ok(config)
    }

    fn apply_env(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            tracing::debug!("Backend URL overridden by {}: {}", API_URL_ENV, url);
            self.api.base_url = url;
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
