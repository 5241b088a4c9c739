use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::models::SortColumn;

/// Persistent settings. Loaded once per process and passed explicitly into
/// the scheduler, aggregator and ranking view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Track share counts across the social providers.
    #[serde(default = "default_true")]
    pub enable_social: bool,

    /// Track page views through the analytics provider.
    #[serde(default)]
    pub enable_analytics: bool,

    /// Show the comments column in the ranking.
    #[serde(default = "default_true")]
    pub enable_comments: bool,

    /// Cache time-to-live in hours. Zero or negative disables caching.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,

    /// Trailing window for the ranking, in months. Zero means unbounded.
    #[serde(default = "default_date_range_months")]
    pub default_date_range_months: u32,

    #[serde(default)]
    pub default_sort_column: SortColumn,

    /// Opaque analytics credential. Analytics fetches are skipped silently
    /// when this is missing or empty.
    pub analytics_token: Option<String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("social-insight");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("metrics.db").to_string_lossy().to_string()
}

fn default_true() -> bool {
    true
}

fn default_ttl_hours() -> i64 {
    24
}

fn default_date_range_months() -> u32 {
    6
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            enable_social: true,
            enable_analytics: false,
            enable_comments: true,
            ttl_hours: default_ttl_hours(),
            default_date_range_months: default_date_range_months(),
            default_sort_column: SortColumn::default(),
            analytics_token: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Remove the saved configuration file. Part of subsystem teardown.
    pub fn delete() -> Result<()> {
        let config_path = Self::config_path();
        if config_path.exists() {
            std::fs::remove_file(config_path)?;
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("social-insight")
            .join("config.toml")
    }

    /// Cache time-to-live as a duration. Zero or negative means metrics are
    /// always considered stale.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours)
    }

    /// The analytics credential, if one is configured and non-empty.
    pub fn analytics_credential(&self) -> Option<&str> {
        self.analytics_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}
