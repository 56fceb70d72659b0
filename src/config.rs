use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite file backing the cache. `db_path = ""` in the config file (or
    /// `None`) disables persistence entirely, `":memory:"` keeps everything
    /// in-process.
    #[serde(default = "default_db_path", serialize_with = "serialize_db_path")]
    pub db_path: Option<String>,

    #[serde(default)]
    pub budgets: Budgets,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    #[serde(default = "default_max_images")]
    pub max_images: usize,

    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,

    #[serde(default = "default_image_timeout")]
    pub image_timeout_secs: u64,
}

/// Maximum row count per table after maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budgets {
    pub readable: usize,
    pub image: usize,
    pub summary: usize,
    pub translation: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            readable: 120,
            image: 480,
            summary: 220,
            translation: 220,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 80,
        }
    }
}

// The directory is created when the store is first opened.
fn default_db_path() -> Option<String> {
    let path = dirs::data_dir()?.join("speedy-reader").join("offline-cache.db");
    Some(path.to_string_lossy().to_string())
}

// TOML has no null, so a disabled store is written as an empty path.
fn serialize_db_path<S: Serializer>(db_path: &Option<String>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(db_path.as_deref().unwrap_or(""))
}

fn default_maintenance_interval() -> u64 {
    30
}

fn default_max_images() -> usize {
    12
}

fn default_image_concurrency() -> usize {
    4
}

fn default_image_timeout() -> u64 {
    20
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::with_db_path(default_db_path())
    }
}

impl CacheConfig {
    fn with_db_path(db_path: Option<String>) -> Self {
        Self {
            db_path,
            budgets: Budgets::default(),
            retry: RetrySettings::default(),
            maintenance_interval_secs: default_maintenance_interval(),
            max_images: default_max_images(),
            image_concurrency: default_image_concurrency(),
            image_timeout_secs: default_image_timeout(),
        }
    }

    /// Defaults backed by an in-memory store.
    pub fn in_memory() -> Self {
        Self::with_db_path(Some(":memory:".to_string()))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: CacheConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = CacheConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CacheError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("speedy-reader")
            .join("offline-cache.toml")
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}
