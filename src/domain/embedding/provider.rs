//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use super::{EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

/// Turns query text into a vector (DashScope, OpenAI-compatible services)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Embeds the request text within the request's timeout
    ///
    /// A non-success status from the remote service is an error, whatever
    /// the transport outcome. So is an answer carrying no vector.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError>;

    fn provider_name(&self) -> &'static str;

    /// Model sent with every request
    fn model(&self) -> &str;
}
