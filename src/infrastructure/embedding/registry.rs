//! Embedding provider registry - builds providers from configuration

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;
use crate::infrastructure::http_client::HttpClient;

use super::dashscope::{DashScopeEmbeddingProvider, DEFAULT_DASHSCOPE_BASE_URL};
use super::openai::{OpenAiEmbeddingProvider, DEFAULT_OPENAI_BASE_URL};

/// Configuration of the embedding backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    /// Provider type, e.g. "dashscope" or "openai"
    #[serde(rename = "type", default)]
    pub provider_type: String,
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider's default endpoint
    #[serde(default)]
    pub base_url: Option<String>,
    /// Overrides the provider's default model
    #[serde(default)]
    pub model: Option<String>,
}

impl EmbeddingProviderConfig {
    pub fn new(provider_type: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

type Validator = fn(&EmbeddingProviderConfig) -> Result<(), DomainError>;
type Constructor = fn(&EmbeddingProviderConfig, HttpClient) -> Arc<dyn EmbeddingProvider>;

#[derive(Debug, Clone, Copy)]
struct Initializer {
    validate: Validator,
    create: Constructor,
}

/// Maps provider type names to their validation and construction routines
#[derive(Debug)]
pub struct EmbeddingProviderRegistry {
    initializers: HashMap<&'static str, Initializer>,
    client: HttpClient,
}

impl Default for EmbeddingProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProviderRegistry {
    /// Registry knowing every built-in provider
    pub fn new() -> Self {
        Self::with_client(HttpClient::new())
    }

    /// Registry whose providers share `client`
    pub fn with_client(client: HttpClient) -> Self {
        let mut initializers = HashMap::new();
        initializers.insert(
            "dashscope",
            Initializer {
                validate: require_api_key,
                create: create_dashscope,
            },
        );
        initializers.insert(
            "openai",
            Initializer {
                validate: require_api_key,
                create: create_openai,
            },
        );

        Self {
            initializers,
            client,
        }
    }

    /// Registered provider type names, sorted
    pub fn provider_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.initializers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Checks `config` without building anything
    pub fn validate(&self, config: &EmbeddingProviderConfig) -> Result<(), DomainError> {
        let initializer = self.initializer(&config.provider_type)?;
        (initializer.validate)(config)
    }

    /// Validates `config` and builds the provider it describes
    pub fn create(
        &self,
        config: &EmbeddingProviderConfig,
    ) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
        let initializer = self.initializer(&config.provider_type)?;
        (initializer.validate)(config)?;
        Ok((initializer.create)(config, self.client.clone()))
    }

    fn initializer(&self, provider_type: &str) -> Result<Initializer, DomainError> {
        self.initializers
            .get(provider_type.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| {
                DomainError::configuration(format!(
                    "Unknown embedding provider type: '{}'. Valid types: {}",
                    provider_type,
                    self.provider_types().join(", ")
                ))
            })
    }
}

fn require_api_key(config: &EmbeddingProviderConfig) -> Result<(), DomainError> {
    if config.api_key.trim().is_empty() {
        return Err(DomainError::configuration(format!(
            "Embedding provider '{}' requires an api_key",
            config.provider_type
        )));
    }
    Ok(())
}

fn create_dashscope(
    config: &EmbeddingProviderConfig,
    client: HttpClient,
) -> Arc<dyn EmbeddingProvider> {
    let base_url = config
        .base_url
        .as_deref()
        .unwrap_or(DEFAULT_DASHSCOPE_BASE_URL);
    let mut provider =
        DashScopeEmbeddingProvider::with_base_url(client, config.api_key.clone(), base_url);
    if let Some(model) = &config.model {
        provider = provider.with_model(model.clone());
    }
    Arc::new(provider)
}

fn create_openai(
    config: &EmbeddingProviderConfig,
    client: HttpClient,
) -> Arc<dyn EmbeddingProvider> {
    let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL);
    let mut provider =
        OpenAiEmbeddingProvider::with_base_url(client, config.api_key.clone(), base_url);
    if let Some(model) = &config.model {
        provider = provider.with_model(model.clone());
    }
    Arc::new(provider)
}
