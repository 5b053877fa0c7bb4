//! Vector store domain - nearest-neighbour index over query embeddings

mod store;

pub use store::{VectorMatch, VectorStore};

#[cfg(test)]
pub use store::MockVectorStore;
