use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};

use crate::vector_store::{
    BoxFuture, DocumentPoint, ScoredPassage, VectorStore, VectorStoreError,
};

const TEXT_FIELD: &str = "text";

/// Qdrant-backed vector store. The collection is expected to be populated
/// out of band; `ensure_collection`/`upsert` exist for seeding and tests.
pub struct QdrantStore {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore").finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Connect to the Qdrant instance at `url`, authenticating with
    /// `api_key` when provided (hosted deployments).
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

impl VectorStore for QdrantStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            if exists {
                return Ok(());
            }

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&collection)
                        .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
                )
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
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
            let qdrant_points: Result<Vec<PointStruct>, VectorStoreError> = points
                .into_iter()
                .map(|p| {
                    let payload: HashMap<String, qdrant_client::qdrant::Value> =
                        serde_json::from_value(serde_json::json!({ TEXT_FIELD: p.text }))
                            .map_err(|e| VectorStoreError::Payload(e.to_string()))?;
                    Ok(PointStruct::new(p.id, p.vector, payload))
                })
                .collect();

            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, qdrant_points?))
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
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
            let builder =
                SearchPointsBuilder::new(&collection, vector, limit).with_payload(true);

            let results = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let passages = results
                .result
                .into_iter()
                .filter_map(|point| {
                    let text = match point.payload.get(TEXT_FIELD).and_then(|v| v.kind.as_ref()) {
                        Some(Kind::StringValue(s)) => s.clone(),
                        _ => {
                            tracing::warn!("search hit without a text payload, skipping");
                            return None;
                        }
                    };
                    let id = match point.id.and_then(|pid| pid.point_id_options) {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => {
                            n.to_string()
                        }
                        None => String::new(),
                    };
                    Some(ScoredPassage {
                        id,
                        score: point.score,
                        text,
                    })
                })
                .collect();

            Ok(passages)
        })
    }
}
