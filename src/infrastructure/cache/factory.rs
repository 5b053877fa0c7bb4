//! Cache factory for runtime selection

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::cache::Cache;
use crate::domain::DomainError;

use super::in_memory::{InMemoryCache, InMemoryCacheConfig};
use super::redis::{RedisCache, RedisCacheConfig};

/// Supported cache types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheType {
    /// In-memory cache using moka
    #[default]
    InMemory,
    /// Redis cache
    Redis,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::InMemory => write!(f, "in_memory"),
            CacheType::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for CacheType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(CacheType::InMemory),
            "redis" => Ok(CacheType::Redis),
            _ => Err(DomainError::configuration(format!(
                "Unknown cache type: {}. Valid types: in_memory, redis",
                s
            ))),
        }
    }
}

/// Response store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "in_memory" or "redis"
    #[serde(rename = "type", default = "default_cache_type")]
    pub cache_type: String,
    /// Redis URL (required for Redis type)
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Redis connect and command timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum entries held by the in-memory store
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

fn default_cache_type() -> String {
    CacheType::InMemory.to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_max_capacity() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: default_cache_type(),
            redis_url: None,
            username: None,
            password: None,
            timeout_ms: default_timeout_ms(),
            max_capacity: default_max_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            cache_type: CacheType::Redis.to_string(),
            redis_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn kind(&self) -> Result<CacheType, DomainError> {
        self.cache_type.parse()
    }

    /// Checks the configuration without connecting
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.kind()? == CacheType::Redis && self.redis_url.as_deref().is_none_or(str::is_empty) {
            return Err(DomainError::configuration(
                "Redis URL is required for Redis cache type",
            ));
        }
        Ok(())
    }
}

/// Factory for creating cache instances
#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates a cache instance based on configuration
    pub async fn create(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>, DomainError> {
        config.validate()?;

        match config.kind()? {
            CacheType::InMemory => {
                let in_memory_config =
                    InMemoryCacheConfig::default().with_max_capacity(config.max_capacity);
                Ok(Arc::new(InMemoryCache::with_config(in_memory_config)))
            }
            CacheType::Redis => {
                let url = config.redis_url.clone().unwrap_or_default();
                let redis_config = RedisCacheConfig::new(url)
                    .with_credentials(config.username.clone(), config.password.clone())
                    .with_timeout(Duration::from_millis(config.timeout_ms));

                let cache = RedisCache::new(redis_config).await?;
                Ok(Arc::new(cache))
            }
        }
    }
}
