//! DashScope text-embedding provider

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::embedding::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;
use crate::infrastructure::http_client::HttpClientTrait;

pub(super) const DEFAULT_DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com";
const DEFAULT_DASHSCOPE_MODEL: &str = "text-embedding-v1";
const EMBEDDING_PATH: &str = "/api/v1/services/embeddings/text-embedding/text-embedding";

/// Embedding provider backed by the DashScope text-embedding API
#[derive(Debug)]
pub struct DashScopeEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
}

impl<C: HttpClientTrait> DashScopeEmbeddingProvider<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_DASHSCOPE_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth_header: format!("Bearer {}", api_key.into()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_DASHSCOPE_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request(&self, request: &EmbeddingRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input": { "texts": [request.text()] },
            "parameters": { "text_type": "query" },
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<EmbeddingResponse, DomainError> {
        let response: DashScopeResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider(
                "dashscope",
                format!("Failed to parse embedding response: {}", e),
            )
        })?;

        debug!(
            request_id = response.request_id.as_deref().unwrap_or("-"),
            count = response.output.embeddings.len(),
            "Received DashScope embeddings"
        );

        let vector = response
            .output
            .embeddings
            .into_iter()
            .find(|e| e.text_index == 0)
            .map(|e| e.embedding)
            .ok_or_else(|| DomainError::provider("dashscope", "No embedding returned"))?;

        let mut embedding = EmbeddingResponse::new(self.model.clone(), vector);
        if let Some(usage) = response.usage {
            embedding = embedding.with_total_tokens(usage.total_tokens);
        }

        Ok(embedding)
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for DashScopeEmbeddingProvider<C> {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        let url = format!("{}{}", self.base_url, EMBEDDING_PATH);
        let body = self.build_request(&request);
        let headers = vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ];

        let response = self
            .client
            .post_json(&url, headers, &body, request.timeout())
            .await?;

        self.parse_response(response)
    }

    fn provider_name(&self) -> &'static str {
        "dashscope"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct DashScopeResponse {
    output: DashScopeOutput,
    #[serde(default)]
    usage: Option<DashScopeUsage>,
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DashScopeOutput {
    embeddings: Vec<DashScopeEmbedding>,
}

#[derive(Debug, Deserialize)]
struct DashScopeEmbedding {
    text_index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct DashScopeUsage {
    total_tokens: u32,
}
