//! Cache lookup orchestration
//!
//! Drives one request through exact match, embedding, similarity search and
//! an optional secondary exact match on the nearest neighbour's key. Every
//! collaborator failure degrades to a pass-through; none reaches the client.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::domain::cache::{Cache, CacheKey};
use crate::domain::embedding::{EmbeddingProvider, EmbeddingRequest};
use crate::domain::semantic_cache::{
    CachedResponse, RequestContext, RequestPhase, SemanticCacheConfig,
};
use crate::domain::vector_store::VectorStore;

/// Terminal result of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Answer the client with this body, the backend is never called
    Served(CachedResponse),
    /// Forward the request to the backend
    PassThrough,
}

impl LookupOutcome {
    pub fn is_served(&self) -> bool {
        matches!(self, LookupOutcome::Served(_))
    }
}

#[derive(Debug)]
enum LookupStage {
    ExactMatch { key: CacheKey, allow_fallback: bool },
    EmbeddingFetch { key: CacheKey },
    SimilaritySearch { key: CacheKey, embedding: Vec<f32> },
    Upload { key: CacheKey, embedding: Vec<f32> },
    Done(LookupOutcome),
}

/// Orchestrates the cache lookup for inbound requests
#[derive(Debug, Clone)]
pub struct CacheLookupService {
    cache: Arc<dyn Cache>,
    embeddings: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    config: Arc<SemanticCacheConfig>,
}

impl CacheLookupService {
    pub fn new(
        cache: Arc<dyn Cache>,
        embeddings: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        config: Arc<SemanticCacheConfig>,
    ) -> Self {
        Self {
            cache,
            embeddings,
            vectors,
            config,
        }
    }

    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    /// Runs the lookup pipeline for `key`
    ///
    /// The request is suspended for the whole pipeline and resumed exactly
    /// once before returning, into `Served` or `Forwarded`. With
    /// `allow_fallback` unset a store miss passes straight through.
    pub async fn lookup(
        &self,
        key: CacheKey,
        ctx: &mut RequestContext,
        allow_fallback: bool,
    ) -> LookupOutcome {
        ctx.suspend();

        let mut stage = LookupStage::ExactMatch {
            key,
            allow_fallback,
        };

        let outcome = loop {
            stage = match stage {
                LookupStage::ExactMatch {
                    key,
                    allow_fallback,
                } => self.exact_match(key, allow_fallback, ctx).await,
                LookupStage::EmbeddingFetch { key } => self.fetch_embedding(key, ctx).await,
                LookupStage::SimilaritySearch { key, embedding } => {
                    self.similarity_search(key, embedding, ctx).await
                }
                LookupStage::Upload { key, embedding } => self.upload(key, embedding, ctx).await,
                LookupStage::Done(outcome) => break outcome,
            };
        };

        let phase = if outcome.is_served() {
            RequestPhase::Served
        } else {
            RequestPhase::Forwarded
        };

        if let Err(e) = ctx.resume(phase) {
            error!(request_id = ctx.request_id(), "Lookup resume failed: {}", e);
        }

        outcome
    }

    async fn exact_match(
        &self,
        key: CacheKey,
        allow_fallback: bool,
        ctx: &mut RequestContext,
    ) -> LookupStage {
        let store_key = key.namespaced(&self.config.key_prefix);

        match self.cache.get(&store_key).await {
            Ok(Some(value)) => {
                info!(request_id = ctx.request_id(), key = %store_key, "Cache hit");
                ctx.clear_cache_key();
                let response = self.config.templates.render(&value, ctx.is_stream());
                return LookupStage::Done(LookupOutcome::Served(response));
            }
            Ok(None) => {
                debug!(request_id = ctx.request_id(), key = %store_key, "Cache miss");
            }
            Err(e) => {
                warn!(
                    request_id = ctx.request_id(),
                    key = %store_key,
                    "Cache store lookup failed, treating as miss: {}",
                    e
                );
            }
        }

        if allow_fallback {
            LookupStage::EmbeddingFetch { key }
        } else {
            LookupStage::Done(LookupOutcome::PassThrough)
        }
    }

    async fn fetch_embedding(&self, key: CacheKey, ctx: &mut RequestContext) -> LookupStage {
        let request = EmbeddingRequest::new(key.as_str(), self.config.embedding_timeout());

        let vector = match self.embeddings.embed(request).await {
            Ok(response) => Some(response.into_vector()),
            Err(e) => {
                warn!(
                    request_id = ctx.request_id(),
                    provider = self.embeddings.provider_name(),
                    "Embedding request failed: {}",
                    e
                );
                None
            }
        };

        match vector.filter(|v| !v.is_empty()) {
            Some(embedding) => {
                debug!(
                    request_id = ctx.request_id(),
                    dimensions = embedding.len(),
                    "Fetched query embedding"
                );
                ctx.stage_key(key.clone());
                ctx.stage_embedding(embedding.clone());
                LookupStage::SimilaritySearch { key, embedding }
            }
            None => {
                ctx.clear_staged();
                LookupStage::Done(LookupOutcome::PassThrough)
            }
        }
    }

    async fn similarity_search(
        &self,
        key: CacheKey,
        embedding: Vec<f32>,
        ctx: &mut RequestContext,
    ) -> LookupStage {
        let matches = match self
            .vectors
            .query(&embedding, self.config.vector_timeout())
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!(
                    request_id = ctx.request_id(),
                    store = self.vectors.provider_name(),
                    "Vector query failed: {}",
                    e
                );
                return LookupStage::Done(LookupOutcome::PassThrough);
            }
        };

        let Some(nearest) = matches.into_iter().next() else {
            debug!(request_id = ctx.request_id(), "Vector store returned no match");
            return LookupStage::Upload { key, embedding };
        };

        if nearest.score() >= self.config.similarity_threshold {
            debug!(
                request_id = ctx.request_id(),
                nearest = nearest.key(),
                score = nearest.score(),
                "Nearest match not similar enough"
            );
            return LookupStage::Upload { key, embedding };
        }

        let Some(alias) = CacheKey::new(nearest.key()) else {
            warn!(request_id = ctx.request_id(), "Vector match carries an empty key");
            return LookupStage::Upload { key, embedding };
        };

        info!(
            request_id = ctx.request_id(),
            key = %key,
            alias = %alias,
            score = nearest.score(),
            "Similar query found"
        );

        // An alias miss writes nothing back
        ctx.clear_cache_key();
        LookupStage::ExactMatch {
            key: alias,
            allow_fallback: false,
        }
    }

    async fn upload(
        &self,
        key: CacheKey,
        embedding: Vec<f32>,
        ctx: &mut RequestContext,
    ) -> LookupStage {
        match self
            .vectors
            .insert(key.as_str(), &embedding, self.config.vector_timeout())
            .await
        {
            Ok(()) => debug!(request_id = ctx.request_id(), key = %key, "Uploaded query embedding"),
            Err(e) => warn!(
                request_id = ctx.request_id(),
                key = %key,
                "Failed to upload query embedding: {}",
                e
            ),
        }

        LookupStage::Done(LookupOutcome::PassThrough)
    }
}
