//! In-memory vector store using linear search

use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::vector_store::{VectorMatch, VectorStore};
use crate::domain::DomainError;

const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// In-memory vector store scoring matches by cosine distance
///
/// Scores are `1 - cosine similarity`, so identical directions score 0.
/// Suitable for development and single-instance deployments; the oldest
/// vector is evicted once `max_entries` is reached.
#[derive(Debug)]
pub struct InMemoryVectorStore {
    entries: RwLock<VecDeque<(String, Vec<f32>)>>,
    max_entries: usize,
    top_k: usize,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl InMemoryVectorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1),
            top_k: 1,
        }
    }

    /// Number of matches returned per query
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn query(
        &self,
        vector: &[f32],
        _timeout: Duration,
    ) -> Result<Vec<VectorMatch>, DomainError> {
        let entries = self.entries.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .filter(|(_, stored)| stored.len() == vector.len())
            .map(|(key, stored)| VectorMatch::new(key, cosine_distance(vector, stored)))
            .collect();

        matches.sort_by(|a, b| a.score().total_cmp(&b.score()));
        matches.truncate(self.top_k);

        Ok(matches)
    }

    async fn insert(
        &self,
        key: &str,
        vector: &[f32],
        _timeout: Duration,
    ) -> Result<(), DomainError> {
        if vector.is_empty() {
            return Err(DomainError::vector_store("Cannot insert an empty vector"));
        }

        let mut entries = self.entries.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        entries.retain(|(existing, _)| existing != key);
        while entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back((key.to_string(), vector.to_vec()));

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

/// `1 - cosine similarity`; zero-norm vectors are maximally distant
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a * norm_b)
}
