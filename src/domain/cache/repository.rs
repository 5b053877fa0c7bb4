//! Cache trait definition

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DomainError;

/// Key/value store holding cached response payloads
///
/// Keys arrive already namespaced. Values are opaque strings; entries without
/// an explicit `expire` call live until the store evicts them.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Gets a value from the cache
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Stores a value without expiry
    async fn set(&self, key: &str, value: &str) -> Result<(), DomainError>;

    /// Sets the TTL for an existing key, returning whether the key existed
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DomainError>;
}
