//! Embedding provider implementations

mod dashscope;
mod openai;
mod registry;

pub use dashscope::DashScopeEmbeddingProvider;
pub use openai::OpenAiEmbeddingProvider;
pub use registry::{EmbeddingProviderConfig, EmbeddingProviderRegistry};
