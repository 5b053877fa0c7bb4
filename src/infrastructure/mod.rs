//! Infrastructure layer - store backends, providers and HTTP plumbing

pub mod cache;
pub mod embedding;
pub mod http_client;
pub mod logging;
pub mod semantic_cache;
pub mod upstream;
pub mod vector_store;
