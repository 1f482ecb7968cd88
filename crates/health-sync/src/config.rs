//! Configuration for sync runs
//!
//! Supports loading configuration from (in order of priority):
//! 1. An explicit JSON file ([`SyncConfig::from_file`])
//! 2. `health-sync.json` in the config directory (~/.config/health-sync/)
//! 3. Built-in defaults
//!
//! The store path falls back to `$HEALTH_SYNC_DB` or `health.sqlite`. A loaded
//! [`SyncConfig`] is immutable and passed explicitly to whatever needs it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::watermark::{Overlap, parse_timestamp};

/// Config filename in the health-sync config directory
const CONFIG_FILE: &str = "health-sync.json";

/// Where history starts for a resource that has never been synced
const DEFAULT_START_DATE: &str = "2010-01-01";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// SQLite store location
    pub db_path: PathBuf,
    pub http: HttpSettings,
    /// Seconds before expiry at which access tokens are refreshed
    pub credential_skew_secs: i64,
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: config::default_db_path(),
            http: HttpSettings::default(),
            credential_skew_secs: crate::credentials::DEFAULT_SKEW_SECS,
            providers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            timeout_secs: 30,
        }
    }
}

/// Per-provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub overlap: Overlap,
    /// First day fetched when a resource has no watermark (`YYYY-MM-DD`)
    pub start_date: String,
    pub page_size: Option<u32>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Vendor-specific keys (base URLs, scopes, redirect URIs, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            overlap: Overlap::default(),
            start_date: DEFAULT_START_DATE.to_string(),
            page_size: None,
            client_id: None,
            client_secret: None,
            extra: Map::new(),
        }
    }
}

impl ProviderSettings {
    /// Start boundary as an instant; an invalid date falls back to the default
    pub fn start_boundary(&self) -> DateTime<Utc> {
        parse_timestamp(&self.start_date)
            .or_else(|| parse_timestamp(DEFAULT_START_DATE))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// String value of a vendor-specific key
    pub fn setting(&self, key: &str) -> Option<&str> {
        match key {
            "client_id" => self.client_id.as_deref(),
            "client_secret" => self.client_secret.as_deref(),
            _ => self.extra.get(key)?.as_str(),
        }
        .filter(|v| !v.is_empty())
    }
}

impl SyncConfig {
    /// Load configuration using the following priority:
    /// 1. `health-sync.json` in the config directory
    /// 2. Built-in defaults
    pub fn load() -> Result<Self> {
        if config::config_exists(CONFIG_FILE) {
            return config::load_json(CONFIG_FILE);
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse config JSON")
    }

    /// Get the default config file path (~/.config/health-sync/health-sync.json)
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderSettings> {
        self.providers.get(id)
    }

    /// Settings for a provider, or a configuration error naming the missing section
    pub fn require_provider(&self, id: &str) -> Result<&ProviderSettings> {
        self.provider(id).ok_or_else(|| {
            SyncError::config(
                format!("No configuration for provider {}", id),
                Some(format!("Add a \"{}\" entry under \"providers\" in {}", id, CONFIG_FILE)),
            )
            .into()
        })
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.provider(id).is_some_and(|p| p.enabled)
    }

    /// Refresh skew; values past the representable range saturate
    pub fn credential_skew(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.credential_skew_secs.max(0))
            .unwrap_or(chrono::Duration::MAX)
    }
}
