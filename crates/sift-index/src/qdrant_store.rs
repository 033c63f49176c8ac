use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, Range,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};

use crate::vector_store::{
    FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Qdrant-backed [`VectorStore`]. One gRPC client serves all modality
/// collections; collection names are chosen by the caller.
pub struct QdrantStore {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore").finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Connect to the given Qdrant URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

fn to_qdrant_payload(
    payload: HashMap<String, serde_json::Value>,
) -> Result<HashMap<String, qdrant_client::qdrant::Value>, VectorStoreError> {
    let json = serde_json::to_value(payload)
        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| VectorStoreError::Serialization(e.to_string()))
}

fn from_qdrant_payload(
    payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> Result<HashMap<String, serde_json::Value>, VectorStoreError> {
    let json = serde_json::to_value(payload)
        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| VectorStoreError::Serialization(e.to_string()))
}

fn point_id_string(id: Option<qdrant_client::qdrant::PointId>) -> Option<String> {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id?.point_id_options? {
        PointIdOptions::Uuid(s) => Some(s),
        PointIdOptions::Num(n) => Some(n.to_string()),
    }
}

#[expect(clippy::cast_precision_loss)]
fn build_filter(filter: &VectorFilter) -> Filter {
    let mut conditions = Vec::new();
    for cond in &filter.must {
        match &cond.value {
            FieldValue::Integer(i) => conditions.push(Condition::matches(cond.field.clone(), *i)),
            FieldValue::Text(s) => {
                conditions.push(Condition::matches(cond.field.clone(), s.clone()));
            }
        }
    }
    for range in &filter.ranges {
        conditions.push(Condition::range(
            range.field.clone(),
            Range {
                gte: range.gte.map(|v| v as f64),
                lte: range.lte.map(|v| v as f64),
                gt: None,
                lt: None,
            },
        ));
    }
    Filter::must(conditions)
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
                .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
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
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut structs = Vec::with_capacity(points.len());
            for p in points {
                let payload = to_qdrant_payload(p.payload)?;
                structs.push(PointStruct::new(p.id, p.vector, payload));
            }
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, structs))
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
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut builder =
                SearchPointsBuilder::new(&collection, vector, limit).with_payload(true);
            if let Some(ref f) = filter
                && !f.is_empty()
            {
                builder = builder.filter(build_filter(f));
            }

            let results = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let mut out = Vec::with_capacity(results.result.len());
            for point in results.result {
                let Some(id) = point_id_string(point.id) else {
                    continue;
                };
                out.push(ScoredVectorPoint {
                    id,
                    score: point.score,
                    payload: from_qdrant_payload(point.payload)?,
                });
            }
            Ok(out)
        })
    }
}
