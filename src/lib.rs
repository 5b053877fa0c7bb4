//! Semantic Cache Gateway
//!
//! A caching reverse proxy for LLM chat backends:
//! - Exact-match answers from a key/value response store
//! - Semantic matches through query embeddings and a vector index
//! - Write-back of streamed and non-streamed backend responses

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use tracing::info;

use api::state::AppState;
use domain::DomainError;
use infrastructure::{
    cache::CacheFactory, embedding::EmbeddingProviderRegistry, http_client::HttpClient,
    upstream::HttpUpstream, vector_store::VectorStoreRegistry,
};

/// Builds every collaborator named by `config` and wires them into state
///
/// Connects to the response store eagerly, so a misconfigured Redis fails
/// here rather than on the first request.
pub async fn create_app_state(config: &AppConfig) -> Result<AppState, DomainError> {
    config.validate()?;

    let cache = CacheFactory::new().create(&config.cache).await?;
    info!(store = %config.cache.cache_type, "Response store ready");

    let client = HttpClient::new();
    let embeddings =
        EmbeddingProviderRegistry::with_client(client.clone()).create(&config.embedding)?;
    let vectors = VectorStoreRegistry::with_client(client).create(&config.vector)?;
    info!(
        embedding = embeddings.provider_name(),
        vector = vectors.provider_name(),
        "Semantic lookup collaborators ready"
    );

    let upstream = HttpUpstream::new(
        &config.server.upstream_url,
        config.server.upstream_timeout(),
    )?;

    AppState::new(
        cache,
        embeddings,
        vectors,
        Arc::new(upstream),
        config.semantic_cache.clone(),
        config.server.max_body_bytes,
    )
}
