use std::time::Duration;

use serde::Deserialize;

use crate::domain::semantic_cache::SemanticCacheConfig;
use crate::domain::DomainError;
use crate::infrastructure::cache::CacheConfig;
use crate::infrastructure::embedding::{EmbeddingProviderConfig, EmbeddingProviderRegistry};
use crate::infrastructure::vector_store::{VectorStoreConfig, VectorStoreRegistry};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingProviderConfig,
    #[serde(default)]
    pub vector: VectorStoreConfig,
    #[serde(default)]
    pub semantic_cache: SemanticCacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL of the LLM backend requests are forwarded to
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// Whole-exchange bound for one forwarded request
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    /// Largest request body buffered for key extraction
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    300
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream_url: default_upstream_url(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Checks every section that can be checked without connecting
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.server.upstream_url.is_empty() {
            return Err(DomainError::configuration("Upstream URL cannot be empty"));
        }

        if self.server.max_body_bytes == 0 {
            return Err(DomainError::configuration(
                "Maximum request body size must be positive",
            ));
        }

        self.cache.validate()?;
        EmbeddingProviderRegistry::new().validate(&self.embedding)?;
        VectorStoreRegistry::new().validate(&self.vector)?;
        self.semantic_cache.validate()?;

        Ok(())
    }
}
