//! Application state for shared services

use std::sync::Arc;

use crate::domain::cache::Cache;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::semantic_cache::{ExtractionRules, SemanticCacheConfig};
use crate::domain::vector_store::VectorStore;
use crate::domain::DomainError;
use crate::infrastructure::semantic_cache::{CacheLookupService, ResponseReconstructor};
use crate::infrastructure::upstream::UpstreamClient;

/// Application state shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub cache: Arc<dyn Cache>,
    pub lookup: CacheLookupService,
    pub reconstructor: ResponseReconstructor,
    pub upstream: Arc<dyn UpstreamClient>,
    pub rules: Arc<ExtractionRules>,
    pub max_body_bytes: usize,
}

impl AppState {
    /// Wires the lookup and write-back paths around the given collaborators
    pub fn new(
        cache: Arc<dyn Cache>,
        embeddings: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        upstream: Arc<dyn UpstreamClient>,
        config: SemanticCacheConfig,
        max_body_bytes: usize,
    ) -> Result<Self, DomainError> {
        config.validate()?;

        let rules = Arc::new(config.extraction_rules()?);
        let reconstructor = ResponseReconstructor::new(cache.clone(), &config)?;
        let lookup = CacheLookupService::new(cache.clone(), embeddings, vectors, Arc::new(config));

        Ok(Self {
            cache,
            lookup,
            reconstructor,
            upstream,
            rules,
            max_body_bytes,
        })
    }
}
