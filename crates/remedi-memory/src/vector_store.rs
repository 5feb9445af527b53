use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("payload error: {0}")]
    Payload(String),
}

/// A passage stored in the index: opaque text plus its embedding.
#[derive(Debug, Clone)]
pub struct DocumentPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
}

/// A search hit, in similarity rank order.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub id: String,
    pub score: f32,
    pub text: String,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist. Idempotent.
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Insert or overwrite passages. Used by seeding tooling and tests; the
    /// serving path only searches.
    fn upsert(
        &self,
        collection: &str,
        points: Vec<DocumentPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Top-`limit` passages by cosine similarity, best first.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredPassage>, VectorStoreError>>;
}
