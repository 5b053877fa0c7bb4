//! Vector store implementations

mod dashvector;
mod in_memory;
mod registry;

pub use dashvector::DashVectorStore;
pub use in_memory::InMemoryVectorStore;
pub use registry::{VectorStoreConfig, VectorStoreRegistry};
