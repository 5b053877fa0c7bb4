//! Embedding response

/// Vector computed for one query text
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResponse {
    model: String,
    vector: Vec<f32>,
    total_tokens: Option<u32>,
}

impl EmbeddingResponse {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
            total_tokens: None,
        }
    }

    /// Records the token count reported by the provider
    pub fn with_total_tokens(mut self, tokens: u32) -> Self {
        self.total_tokens = Some(tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    pub fn total_tokens(&self) -> Option<u32> {
        self.total_tokens
    }

    pub fn into_vector(self) -> Vec<f32> {
        self.vector
    }
}
