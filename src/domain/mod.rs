//! Domain layer - contracts and models of the semantic cache

pub mod cache;
pub mod embedding;
pub mod error;
pub mod semantic_cache;
pub mod vector_store;

pub use error::DomainError;
