//! Vector store trait and result type

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Nearest-neighbour hit returned by a vector store query
///
/// `score` is provider-defined; callers treat a lower score as closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Cache key the stored vector was inserted under
    key: String,
    /// Distance between the query vector and the stored vector
    score: f32,
}

impl VectorMatch {
    pub fn new(key: impl Into<String>, score: f32) -> Self {
        Self {
            key: key.into(),
            score,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}

/// Index of (cache key, embedding) pairs answering nearest-neighbour queries
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorStore: Send + Sync + Debug {
    /// Returns the closest stored vectors, best match first; may be empty
    async fn query(
        &self,
        vector: &[f32],
        timeout: Duration,
    ) -> Result<Vec<VectorMatch>, DomainError>;

    /// Inserts `vector` so later queries can resolve it back to `key`
    async fn insert(&self, key: &str, vector: &[f32], timeout: Duration)
        -> Result<(), DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_match_accessors() {
        let hit = VectorMatch::new("what is rust", 0.05);

        assert_eq!(hit.key(), "what is rust");
        assert!((hit.score() - 0.05).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_mock_vector_store() {
        let mut mock = MockVectorStore::new();
        mock.expect_query()
            .times(1)
            .returning(|_, _| Ok(vec![VectorMatch::new("k2", 0.05)]));

        let result = mock.query(&[0.1, 0.2], Duration::from_secs(1)).await.unwrap();

        assert_eq!(result, vec![VectorMatch::new("k2", 0.05)]);
    }
}
