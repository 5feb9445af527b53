//! Vector index access: an object-safe store trait and its Qdrant backend.

#[cfg(any(test, feature = "mock"))]
pub mod in_memory_store;
pub mod qdrant;
pub mod vector_store;

pub use qdrant::QdrantStore;
pub use vector_store::{DocumentPoint, ScoredPassage, VectorStore, VectorStoreError};
