//! Vector store registry - builds stores from configuration

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::vector_store::VectorStore;
use crate::domain::DomainError;
use crate::infrastructure::http_client::HttpClient;

use super::dashvector::DashVectorStore;
use super::in_memory::InMemoryVectorStore;

/// Configuration of the vector store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Store type, e.g. "dashvector" or "in_memory"
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,
    #[serde(default)]
    pub api_key: String,
    /// Service endpoint, with or without scheme
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub collection: String,
    /// Capacity of the in-memory store
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_store_type() -> String {
    "in_memory".to_string()
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            store_type: default_store_type(),
            api_key: String::new(),
            endpoint: String::new(),
            collection: String::new(),
            max_entries: default_max_entries(),
        }
    }
}

impl VectorStoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn dashvector(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store_type: "dashvector".to_string(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            collection: collection.into(),
            ..Default::default()
        }
    }
}

type Validator = fn(&VectorStoreConfig) -> Result<(), DomainError>;
type Constructor = fn(&VectorStoreConfig, HttpClient) -> Arc<dyn VectorStore>;

#[derive(Debug, Clone, Copy)]
struct Initializer {
    validate: Validator,
    create: Constructor,
}

/// Maps store type names to their validation and construction routines
#[derive(Debug)]
pub struct VectorStoreRegistry {
    initializers: HashMap<&'static str, Initializer>,
    client: HttpClient,
}

impl Default for VectorStoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStoreRegistry {
    pub fn new() -> Self {
        Self::with_client(HttpClient::new())
    }

    pub fn with_client(client: HttpClient) -> Self {
        let mut initializers = HashMap::new();
        initializers.insert(
            "dashvector",
            Initializer {
                validate: validate_dashvector,
                create: create_dashvector,
            },
        );
        initializers.insert(
            "in_memory",
            Initializer {
                validate: |_| Ok(()),
                create: create_in_memory,
            },
        );

        Self {
            initializers,
            client,
        }
    }

    /// Registered store type names, sorted
    pub fn store_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.initializers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn validate(&self, config: &VectorStoreConfig) -> Result<(), DomainError> {
        let initializer = self.initializer(&config.store_type)?;
        (initializer.validate)(config)
    }

    /// Validates `config` and builds the store it describes
    pub fn create(&self, config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>, DomainError> {
        let initializer = self.initializer(&config.store_type)?;
        (initializer.validate)(config)?;
        Ok((initializer.create)(config, self.client.clone()))
    }

    fn initializer(&self, store_type: &str) -> Result<Initializer, DomainError> {
        self.initializers
            .get(store_type.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| {
                DomainError::configuration(format!(
                    "Unknown vector store type: '{}'. Valid types: {}",
                    store_type,
                    self.store_types().join(", ")
                ))
            })
    }
}

fn validate_dashvector(config: &VectorStoreConfig) -> Result<(), DomainError> {
    let required = [
        ("api_key", &config.api_key),
        ("endpoint", &config.endpoint),
        ("collection", &config.collection),
    ];

    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(DomainError::configuration(format!(
                "DashVector store requires '{}'",
                name
            )));
        }
    }
    Ok(())
}

fn create_dashvector(config: &VectorStoreConfig, client: HttpClient) -> Arc<dyn VectorStore> {
    Arc::new(DashVectorStore::new(
        client,
        config.api_key.clone(),
        &config.endpoint,
        config.collection.clone(),
    ))
}

fn create_in_memory(config: &VectorStoreConfig, _client: HttpClient) -> Arc<dyn VectorStore> {
    Arc::new(InMemoryVectorStore::new(config.max_entries))
}
