//! DashVector vector store client

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::vector_store::{VectorMatch, VectorStore};
use crate::domain::DomainError;
use crate::infrastructure::http_client::HttpClientTrait;

/// Document field holding the cache key of a stored vector
const KEY_FIELD: &str = "query";
const TOP_K: usize = 1;

/// Vector store backed by a DashVector collection
#[derive(Debug)]
pub struct DashVectorStore<C: HttpClientTrait> {
    client: C,
    api_key: String,
    endpoint: String,
    collection: String,
}

impl<C: HttpClientTrait> DashVectorStore<C> {
    /// `endpoint` may omit the scheme, in which case https is assumed
    pub fn new(
        client: C,
        api_key: impl Into<String>,
        endpoint: impl AsRef<str>,
        collection: impl Into<String>,
    ) -> Self {
        let endpoint = endpoint.as_ref().trim_end_matches('/');
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        };

        Self {
            client,
            api_key: api_key.into(),
            endpoint,
            collection: collection.into(),
        }
    }

    fn collection_url(&self, action: &str) -> String {
        format!(
            "{}/v1/collections/{}/{}",
            self.endpoint, self.collection, action
        )
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("dashvector-auth-token", self.api_key.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn check_status(response: &DashVectorResponse) -> Result<(), DomainError> {
        if response.code != 0 {
            return Err(DomainError::vector_store(format!(
                "DashVector returned code {}: {}",
                response.code,
                response.message.as_deref().unwrap_or_default()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: HttpClientTrait> VectorStore for DashVectorStore<C> {
    async fn query(
        &self,
        vector: &[f32],
        timeout: Duration,
    ) -> Result<Vec<VectorMatch>, DomainError> {
        let body = serde_json::json!({
            "vector": vector,
            "topk": TOP_K,
            "include_vector": false,
        });

        let json = self
            .client
            .post_json(&self.collection_url("query"), self.headers(), &body, timeout)
            .await?;

        let response: DashVectorResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::vector_store(format!("Failed to parse DashVector query response: {}", e))
        })?;
        Self::check_status(&response)?;

        debug!(
            request_id = response.request_id.as_deref().unwrap_or("-"),
            hits = response.output.len(),
            "DashVector query completed"
        );

        // Documents without a key field cannot be resolved back to a cache entry
        Ok(response
            .output
            .into_iter()
            .filter_map(|doc| {
                doc.fields
                    .get(KEY_FIELD)
                    .and_then(|v| v.as_str())
                    .map(|key| VectorMatch::new(key, doc.score))
            })
            .collect())
    }

    async fn insert(
        &self,
        key: &str,
        vector: &[f32],
        timeout: Duration,
    ) -> Result<(), DomainError> {
        let body = serde_json::json!({
            "docs": [{
                "vector": vector,
                "fields": { KEY_FIELD: key },
            }]
        });

        let json = self
            .client
            .post_json(&self.collection_url("docs"), self.headers(), &body, timeout)
            .await?;

        let response: DashVectorResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::vector_store(format!("Failed to parse DashVector insert response: {}", e))
        })?;
        Self::check_status(&response)
    }

    fn provider_name(&self) -> &'static str {
        "dashvector"
    }
}

#[derive(Debug, Deserialize)]
struct DashVectorResponse {
    code: i64,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    output: Vec<DashVectorDoc>,
}

#[derive(Debug, Deserialize)]
struct DashVectorDoc {
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
    score: f32,
}
