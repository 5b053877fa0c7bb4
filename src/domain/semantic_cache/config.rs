//! Semantic cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::path::FieldPath;
use super::template::ResponseTemplates;
use crate::domain::DomainError;

/// Configuration for semantic caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Request body path the cache key is read from
    #[serde(default = "default_cache_key_from")]
    pub cache_key_from: String,

    /// Response body path holding the cacheable value (non-streamed)
    #[serde(default = "default_cache_value_from")]
    pub cache_value_from: String,

    /// Event path holding the incremental content (streamed)
    #[serde(default = "default_cache_stream_value_from")]
    pub cache_stream_value_from: String,

    /// Event path whose presence marks a tool invocation
    #[serde(default = "default_tool_calls_from")]
    pub tool_calls_from: String,

    /// Namespace prefix applied to every cache store key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Vector matches scoring below this value count as the same query
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Time-to-live for cached entries in seconds, 0 disables expiry
    #[serde(default)]
    pub cache_ttl_secs: u64,

    /// Upper bound for one embedding call
    #[serde(default = "default_timeout_ms")]
    pub embedding_timeout_ms: u64,

    /// Upper bound for one vector store query or insert
    #[serde(default = "default_timeout_ms")]
    pub vector_timeout_ms: u64,

    /// Templates used to answer cache hits
    #[serde(default)]
    pub templates: ResponseTemplates,
}

fn default_cache_key_from() -> String {
    "messages.@reverse.0.content".to_string()
}

fn default_cache_value_from() -> String {
    "choices.0.message.content".to_string()
}

fn default_cache_stream_value_from() -> String {
    "choices.0.delta.content".to_string()
}

fn default_tool_calls_from() -> String {
    "choices.0.delta.tool_calls".to_string()
}

fn default_key_prefix() -> String {
    "ai-cache:".to_string()
}

fn default_similarity_threshold() -> f32 {
    0.1
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            cache_key_from: default_cache_key_from(),
            cache_value_from: default_cache_value_from(),
            cache_stream_value_from: default_cache_stream_value_from(),
            tool_calls_from: default_tool_calls_from(),
            key_prefix: default_key_prefix(),
            similarity_threshold: default_similarity_threshold(),
            cache_ttl_secs: 0,
            embedding_timeout_ms: default_timeout_ms(),
            vector_timeout_ms: default_timeout_ms(),
            templates: ResponseTemplates::default(),
        }
    }
}

impl SemanticCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// TTL applied after each write, `None` when expiry is disabled
    pub fn ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.vector_timeout_ms)
    }

    /// Set the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the request path the key is read from
    pub fn with_cache_key_from(mut self, path: impl Into<String>) -> Self {
        self.cache_key_from = path.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.key_prefix.is_empty() {
            return Err(DomainError::validation("Cache key prefix cannot be empty"));
        }

        if !self.similarity_threshold.is_finite() || self.similarity_threshold < 0.0 {
            return Err(DomainError::validation(format!(
                "Similarity threshold must be a non-negative number, got {}",
                self.similarity_threshold
            )));
        }

        if self.embedding_timeout_ms == 0 || self.vector_timeout_ms == 0 {
            return Err(DomainError::validation("Collaborator timeouts must be positive"));
        }

        self.templates.validate()?;
        self.extraction_rules()?;

        Ok(())
    }

    /// Parses the configured field paths
    pub fn extraction_rules(&self) -> Result<ExtractionRules, DomainError> {
        Ok(ExtractionRules {
            key_from: FieldPath::parse(&self.cache_key_from)?,
            value_from: FieldPath::parse(&self.cache_value_from)?,
            stream_value_from: FieldPath::parse(&self.cache_stream_value_from)?,
            tool_calls_from: FieldPath::parse(&self.tool_calls_from)?,
        })
    }
}

/// Parsed field paths shared by the lookup and write-back paths
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    pub key_from: FieldPath,
    pub value_from: FieldPath,
    pub stream_value_from: FieldPath,
    pub tool_calls_from: FieldPath,
}
