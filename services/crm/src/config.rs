//! Configuration of the data layer
//!
//! Loaded from defaults, an optional settings file and `CRM_`-prefixed
//! environment variables (`CRM_SESSION__REFRESH_MARGIN_SECS=120`).

use chrono::Duration;
use common::{cache::RedisConfig, config::load_settings, database::DatabaseConfig};
use config::ConfigError;
use serde::Deserialize;

/// Session lifecycle settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Credentials expiring within this many seconds are refreshed on use
    pub refresh_margin_secs: i64,
    /// Redis key holding the persisted session
    pub persistence_key: String,
    /// Lifetime of the persisted session, matching the refresh credential
    pub persistence_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 60,
            persistence_key: "crm:session".to_string(),
            persistence_ttl_secs: 604_800,
        }
    }
}

impl SessionConfig {
    pub fn refresh_margin(&self) -> Duration {
        Duration::seconds(self.refresh_margin_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub session: SessionConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
}

impl CrmConfig {
    /// Load from the environment only
    pub fn from_env() -> Result<Self, ConfigError> {
        load_settings("CRM", None)
    }

    /// Load from `path` (missing files are skipped) overlaid by the environment
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        load_settings("CRM", Some(path))
    }
}
