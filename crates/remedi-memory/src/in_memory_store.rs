//! Test-only vector store with exact cosine scoring.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, DocumentPoint, ScoredPassage, VectorStore, VectorStoreError,
};

struct StoredPoint {
    vector: Vec<f32>,
    text: String,
}

pub struct InMemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, StoredPoint>>>,
    pub fail_search: bool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            fail_search: false,
        }
    }

    /// A store whose every search fails, for exercising the error path.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_search: true,
            ..Self::new()
        }
    }

    /// Seed a collection with pre-embedded passages.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (test-only type).
    pub fn seed(&self, collection: &str, points: Vec<DocumentPoint>) {
        let mut cols = self.collections.write().unwrap();
        let col = cols.entry(collection.to_owned()).or_default();
        for p in points {
            col.insert(
                p.id,
                StoredPoint {
                    vector: p.vector,
                    text: p.text,
                },
            );
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorStore for InMemoryStore {
    fn ensure_collection(
        &self,
        collection: &str,
        _vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.entry(collection).or_default();
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<DocumentPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.entry(collection).or_default();
            for p in points {
                col.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        text: p.text,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredPassage>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if self.fail_search {
                return Err(VectorStoreError::Search("simulated search failure".into()));
            }
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let Some(col) = cols.get(&collection) else {
                return Ok(Vec::new());
            };

            let mut scored: Vec<ScoredPassage> = col
                .iter()
                .map(|(id, p)| ScoredPassage {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &p.vector),
                    text: p.text.clone(),
                })
                .collect();
            scored.sort_by(|a, b| b.score.total_cmp(&a.score));
            scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(scored)
        })
    }
}
