//! Application configuration management.
//!
//! Configuration is stored at `~/.config/pitwall/config.json`. Every field has
//! a default, so a missing file or a partial one is fine. Two environment
//! variables override the file:
//!
//! - `PITWALL_CACHE_DIR`: where payloads and metadata live
//! - `PITWALL_API_BASE_URL`: root of the Ergast-compatible API

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "pitwall";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// The original ergast.com service is retired; this mirror serves the same API.
pub const DEFAULT_BASE_URL: &str = "https://api.jolpi.ca/ergast/f1";

pub const CACHE_DIR_ENV: &str = "PITWALL_CACHE_DIR";
pub const BASE_URL_ENV: &str = "PITWALL_API_BASE_URL";

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(rename = "timeout")]
    pub timeout_secs: u64,
    /// Retries after an HTTP 429 before giving up
    pub max_retries: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 5,
            max_retries: 2,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Refresh policy for one cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Minimum seconds between fetches
    #[serde(rename = "refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Age in seconds past which status reports the entry as old. Old entries are still served.
    #[serde(rename = "max_age")]
    pub max_age_secs: u64,
    /// `None` = unlimited
    pub max_fetches_per_day: Option<u32>,
    /// Tighten or relax the interval around the next race date
    pub schedule_aware: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DAY_SECS,
            max_age_secs: 7 * DAY_SECS,
            max_fetches_per_day: Some(10),
            schedule_aware: true,
        }
    }
}

impl CacheSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub driver_standings: CacheSettings,
    pub constructor_standings: CacheSettings,
    pub next_race: CacheSettings,
    pub last_race: CacheSettings,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        let race = CacheSettings {
            max_fetches_per_day: Some(5),
            ..CacheSettings::default()
        };
        Self {
            driver_standings: CacheSettings::default(),
            constructor_standings: CacheSettings::default(),
            next_race: race,
            last_race: race,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_dir: Option<PathBuf>,
    pub api: ApiSettings,
    pub cache: ResourceSettings,
}

impl Config {
    /// Load the user config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url;
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
