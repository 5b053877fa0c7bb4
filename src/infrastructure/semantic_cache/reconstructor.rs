//! Response reconstruction and cache write-back
//!
//! Observes the backend response as it streams to the client and rebuilds
//! the single value worth caching. Fragments are always handed back
//! unchanged; caching never delays or alters delivery.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, warn, Instrument};

use super::sse;
use crate::domain::cache::Cache;
use crate::domain::semantic_cache::{ExtractionRules, RequestContext, SemanticCacheConfig};
use crate::domain::DomainError;

/// Value ready to be stored under its namespaced key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWrite {
    pub key: String,
    pub value: String,
}

/// Rebuilds cacheable values from backend responses and writes them back
#[derive(Debug, Clone)]
pub struct ResponseReconstructor {
    cache: Arc<dyn Cache>,
    rules: Arc<ExtractionRules>,
    key_prefix: String,
    ttl: Option<Duration>,
}

impl ResponseReconstructor {
    pub fn new(cache: Arc<dyn Cache>, config: &SemanticCacheConfig) -> Result<Self, DomainError> {
        Ok(Self {
            cache,
            rules: Arc::new(config.extraction_rules()?),
            key_prefix: config.key_prefix.clone(),
            ttl: config.ttl(),
        })
    }

    /// Observes one response fragment and returns it for forwarding
    ///
    /// On the last fragment the reconstructed value, if any, is written back
    /// on a background task. Must run inside a tokio runtime.
    pub fn process_chunk(&self, ctx: &mut RequestContext, chunk: Bytes, is_last: bool) -> Bytes {
        if ctx.has_tool_calls() || ctx.cache_key().is_none() {
            return chunk;
        }

        if !is_last {
            if ctx.is_stream() {
                self.consume_stream(ctx, &chunk);
            } else {
                ctx.append_document(&chunk);
            }
            return chunk;
        }

        if let Some(write) = self.finish(ctx, &chunk) {
            let this = self.clone();
            tokio::spawn(async move { this.persist(write).await }.in_current_span());
        }

        chunk
    }

    /// Completes reconstruction with the final fragment
    ///
    /// Consumes the staged key, so a context yields at most one write.
    pub fn finish(&self, ctx: &mut RequestContext, chunk: &[u8]) -> Option<CacheWrite> {
        if ctx.has_tool_calls() {
            return None;
        }

        let key = ctx.take_cache_key()?;

        let value = if ctx.is_stream() {
            self.finish_stream(ctx, chunk)
        } else {
            self.finish_document(ctx, chunk)
        };

        if ctx.has_tool_calls() {
            debug!(request_id = ctx.request_id(), "Tool call response, not caching");
            return None;
        }

        match value {
            Some(value) if !value.is_empty() => Some(CacheWrite {
                key: key.namespaced(&self.key_prefix),
                value,
            }),
            _ => {
                warn!(
                    request_id = ctx.request_id(),
                    key = %key,
                    "No cacheable value in response"
                );
                None
            }
        }
    }

    /// Stores the value, then applies the TTL if one is configured
    ///
    /// Failures are logged and never retried.
    pub async fn persist(&self, write: CacheWrite) {
        if let Err(e) = self.cache.set(&write.key, &write.value).await {
            warn!(key = %write.key, "Failed to write cache entry: {}", e);
            return;
        }

        info!(key = %write.key, bytes = write.value.len(), "Cached response");

        if let Some(ttl) = self.ttl {
            if let Err(e) = self.cache.expire(&write.key, ttl).await {
                warn!(key = %write.key, "Failed to set cache entry TTL: {}", e);
            }
        }
    }

    fn finish_document(&self, ctx: &mut RequestContext, chunk: &[u8]) -> Option<String> {
        ctx.append_document(chunk);
        let body = ctx.take_document();

        let document: Value = match serde_json::from_slice(&body) {
            Ok(document) => document,
            Err(e) => {
                warn!(request_id = ctx.request_id(), "Response body is not JSON: {}", e);
                return None;
            }
        };

        self.rules.value_from.extract_raw(&document)
    }

    fn finish_stream(&self, ctx: &mut RequestContext, chunk: &[u8]) -> Option<String> {
        let mut buffer = ctx.take_partial_event();
        buffer.extend_from_slice(chunk);

        let (events, rest) = sse::split_events(&buffer);
        for event in events {
            self.consume_event(ctx, event);
        }

        if !rest.is_empty() {
            if ctx.content().is_none() {
                warn!(
                    request_id = ctx.request_id(),
                    pending = rest.len(),
                    "Event stream ended mid-event"
                );
                return None;
            }
            debug!(
                request_id = ctx.request_id(),
                pending = rest.len(),
                "Dropping unterminated trailing event"
            );
        }

        ctx.take_content()
    }

    fn consume_stream(&self, ctx: &mut RequestContext, chunk: &[u8]) {
        let mut buffer = ctx.take_partial_event();
        buffer.extend_from_slice(chunk);

        let (events, rest) = sse::split_events(&buffer);
        for event in events {
            self.consume_event(ctx, event);
        }

        ctx.set_partial_event(rest);
    }

    fn consume_event(&self, ctx: &mut RequestContext, event: &[u8]) {
        if ctx.has_tool_calls() {
            return;
        }

        let Some(data) = sse::event_data(event) else {
            return;
        };

        let payload: Value = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(request_id = ctx.request_id(), "Unparseable event payload: {}", e);
                return;
            }
        };

        if self.rules.tool_calls_from.is_present(&payload) {
            ctx.mark_tool_calls();
            return;
        }

        match self.rules.stream_value_from.extract_raw(&payload) {
            Some(piece) => ctx.append_content(&piece),
            None => debug!(request_id = ctx.request_id(), "Event without content"),
        }
    }
}
