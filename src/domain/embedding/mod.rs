//! Query embedding contract
//!
//! One text in, one vector out. The model is fixed by provider configuration.

mod provider;
mod request;
mod response;

pub use provider::EmbeddingProvider;
pub use request::EmbeddingRequest;
pub use response::EmbeddingResponse;

#[cfg(test)]
pub use provider::mock::MockEmbeddingProvider;
