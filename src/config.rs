use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{DEFAULT_MAX_POSITIONS, DEFAULT_POSITION_TTL_SECS};
use crate::events::DEFAULT_MAX_EVENTS;
use crate::service::{
    ServiceConfig, DEFAULT_ERROR_BACKOFF, DEFAULT_MAINTENANCE_INTERVAL,
    DEFAULT_MAX_TRAJECTORY_POINTS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    pub orbit: OrbitConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl", deserialize_with = "human_duration")]
    pub ttl: Duration,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            max_positions: default_max_positions(),
        }
    }
}

fn default_ttl() -> Duration {
    Duration::from_secs(DEFAULT_POSITION_TTL_SECS as u64)
}

fn default_max_positions() -> usize {
    DEFAULT_MAX_POSITIONS
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
        }
    }
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_interval", deserialize_with = "human_duration")]
    pub interval: Duration,
    #[serde(default = "default_backoff", deserialize_with = "human_duration")]
    pub error_backoff: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            error_backoff: default_backoff(),
        }
    }
}

fn default_interval() -> Duration {
    DEFAULT_MAINTENANCE_INTERVAL
}

fn default_backoff() -> Duration {
    DEFAULT_ERROR_BACKOFF
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrbitConfig {
    pub tle_folder: PathBuf,
    #[serde(default = "default_max_trajectory_points")]
    pub max_trajectory_points: usize,
}

fn default_max_trajectory_points() -> usize {
    DEFAULT_MAX_TRAJECTORY_POINTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub permissions: HashSet<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadPositions,
    UpdatePositions,
    ManageCache,
}

fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.ttl.is_zero() {
            return Err(ConfigError::Invalid("cache.ttl must be positive".into()));
        }
        if self.cache.max_positions == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_positions must be positive".into(),
            ));
        }
        if self.events.max_events == 0 {
            return Err(ConfigError::Invalid(
                "events.max_events must be positive".into(),
            ));
        }
        if self.orbit.max_trajectory_points == 0 {
            return Err(ConfigError::Invalid(
                "orbit.max_trajectory_points must be positive".into(),
            ));
        }
        if self.maintenance.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "maintenance.interval must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn find_api_key(&self, key: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.key == key)
    }
}

impl TryFrom<&Config> for ServiceConfig {
    type Error = ConfigError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        let position_ttl = chrono::Duration::from_std(config.cache.ttl)
            .map_err(|e| ConfigError::Invalid(format!("cache.ttl: {e}")))?;

        Ok(ServiceConfig {
            position_ttl,
            max_positions: config.cache.max_positions,
            max_events: config.events.max_events,
            maintenance_interval: config.maintenance.interval,
            error_backoff: config.maintenance.error_backoff,
            max_trajectory_points: config.orbit.max_trajectory_points,
        })
    }
}
