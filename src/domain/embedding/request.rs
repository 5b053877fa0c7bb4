use std::time::Duration;

/// Query text to embed, bounded by a per-call timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingRequest {
    text: String,
    timeout: Duration,
}

impl EmbeddingRequest {
    pub fn new(text: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            timeout,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
