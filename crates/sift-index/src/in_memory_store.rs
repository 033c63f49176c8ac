use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use crate::vector_store::{
    FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

struct InMemoryCollection {
    points: HashMap<String, StoredPoint>,
}

/// Exact-scan store for tests and single-process deployments.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
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

fn matches_filter(payload: &HashMap<String, serde_json::Value>, filter: &VectorFilter) -> bool {
    for cond in &filter.must {
        let Some(val) = payload.get(&cond.field) else {
            return false;
        };
        if !field_matches(val, &cond.value) {
            return false;
        }
    }
    for range in &filter.ranges {
        let Some(val) = payload.get(&range.field).and_then(serde_json::Value::as_i64) else {
            return false;
        };
        if range.gte.is_some_and(|gte| val < gte) || range.lte.is_some_and(|lte| val > lte) {
            return false;
        }
    }
    true
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
    }
}

impl VectorStore for InMemoryVectorStore {
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
            cols.entry(collection)
                .or_insert_with(|| InMemoryCollection {
                    points: HashMap::new(),
                });
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
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            for p in points {
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
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
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;

            let empty_filter = VectorFilter::default();
            let f = filter.as_ref().unwrap_or(&empty_filter);

            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| matches_filter(&sp.payload, f))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();

            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            #[expect(clippy::cast_possible_truncation)]
            scored.truncate(limit as usize);
            Ok(scored)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::{FieldCondition, RangeCondition};

    fn point(id: &str, vector: Vec<f32>, payload: &[(&str, serde_json::Value)]) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: payload
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        store.ensure_collection("test", 3).await.unwrap();
        store.upsert("test", vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_and_search_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();

        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], &[]),
                    point("b", vec![0.0, 1.0, 0.0], &[]),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn search_unknown_collection_errors() {
        let store = InMemoryVectorStore::new();
        let result = store.search("missing", vec![1.0], 5, None).await;
        assert!(matches!(result, Err(VectorStoreError::Search(_))));
    }

    #[tokio::test]
    async fn search_with_equality_filter() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();

        store
            .upsert(
                "test",
                vec![
                    point(
                        "a",
                        vec![1.0, 0.0, 0.0],
                        &[("user_id", serde_json::json!("u1"))],
                    ),
                    point(
                        "b",
                        vec![0.9, 0.1, 0.0],
                        &[("user_id", serde_json::json!("u2"))],
                    ),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter {
            must: vec![FieldCondition {
                field: "user_id".into(),
                value: FieldValue::Text("u1".into()),
            }],
            ranges: vec![],
        };
        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn range_filter_excludes_out_of_range_timestamps() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();

        // Three chunks from yesterday, two from last week.
        let yesterday = 1_700_000_000_i64;
        let last_week = yesterday - 6 * 86_400;
        store
            .upsert(
                "test",
                vec![
                    point("y1", vec![1.0, 0.0, 0.0], &[("timestamp", serde_json::json!(yesterday))]),
                    point("y2", vec![0.9, 0.1, 0.0], &[("timestamp", serde_json::json!(yesterday + 100))]),
                    point("y3", vec![0.8, 0.2, 0.0], &[("timestamp", serde_json::json!(yesterday + 200))]),
                    point("w1", vec![1.0, 0.0, 0.0], &[("timestamp", serde_json::json!(last_week))]),
                    point("w2", vec![0.95, 0.05, 0.0], &[("timestamp", serde_json::json!(last_week + 100))]),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter {
            must: vec![],
            ranges: vec![RangeCondition {
                field: "timestamp".into(),
                gte: Some(yesterday),
                lte: Some(yesterday + 86_400),
            }],
        };
        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(results.len(), 3);
        assert!(ids.contains(&"y1") && ids.contains(&"y2") && ids.contains(&"y3"));
    }

    #[tokio::test]
    async fn range_filter_missing_field_excludes_point() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 2).await.unwrap();
        store
            .upsert("test", vec![point("a", vec![1.0, 0.0], &[])])
            .await
            .unwrap();

        let filter = VectorFilter {
            must: vec![],
            ranges: vec![RangeCondition {
                field: "timestamp".into(),
                gte: Some(0),
                lte: None,
            }],
        };
        let results = store
            .search("test", vec![1.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b)).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!((cosine_similarity(&[0.0, 0.0], &[1.0, 0.0])).abs() < f32::EPSILON);
    }
}
