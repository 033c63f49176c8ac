use std::collections::HashMap;
use std::sync::Arc;

use crate::error::IndexError;
use crate::types::Modality;
use crate::vector_store::{VectorPoint, VectorStore};

/// One document's worth of pre-embedded chunks from a collector. Vectors
/// must come from the same embedding model the query path uses, or search
/// scores are meaningless.
#[derive(Debug, Clone)]
pub struct IngestRecord {
    pub doc_id: String,
    pub modality: Modality,
    pub vectors: Vec<Vec<f32>>,
    pub metadatas: Vec<HashMap<String, serde_json::Value>>,
}

/// Write side of the index, consumed by external collectors. Point ids are
/// derived deterministically from `(doc_id, chunk index)` so re-ingesting a
/// document overwrites its previous chunks instead of duplicating them.
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    collection_prefix: String,
    vector_dim: usize,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("collection_prefix", &self.collection_prefix)
            .field("vector_dim", &self.vector_dim)
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, collection_prefix: String, vector_dim: usize) -> Self {
        Self {
            store,
            collection_prefix,
            vector_dim,
        }
    }

    /// Create all modality collections. Called once at startup, before the
    /// first request is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unreachable.
    pub async fn ensure_collections(&self) -> Result<(), IndexError> {
        for modality in Modality::ALL {
            self.store
                .ensure_collection(
                    &modality.collection(&self.collection_prefix),
                    self.vector_dim as u64,
                )
                .await?;
        }
        Ok(())
    }

    /// Index one document: one point per chunk/patch, written to the
    /// record's modality collection.
    ///
    /// Returns the number of points written.
    ///
    /// # Errors
    ///
    /// Rejects records whose vector and metadata counts differ or whose
    /// vectors have the wrong dimension; propagates store failures.
    pub async fn index(&self, record: IngestRecord) -> Result<usize, IndexError> {
        if record.vectors.len() != record.metadatas.len() {
            return Err(IndexError::Ingest(format!(
                "{} vectors but {} metadatas for doc {}",
                record.vectors.len(),
                record.metadatas.len(),
                record.doc_id
            )));
        }
        if let Some(bad) = record.vectors.iter().find(|v| v.len() != self.vector_dim) {
            return Err(IndexError::Ingest(format!(
                "vector dimension {} does not match index dimension {} for doc {}",
                bad.len(),
                self.vector_dim,
                record.doc_id
            )));
        }

        let IngestRecord {
            doc_id,
            modality,
            vectors,
            metadatas,
        } = record;
        let count = vectors.len();
        let points: Vec<VectorPoint> = vectors
            .into_iter()
            .zip(metadatas)
            .enumerate()
            .map(|(i, (vector, mut payload))| {
                payload.insert("doc_id".into(), serde_json::json!(doc_id.clone()));
                payload.insert("chunk".into(), serde_json::json!(i));
                VectorPoint {
                    id: chunk_point_id(&doc_id, i),
                    vector,
                    payload,
                }
            })
            .collect();

        let collection = modality.collection(&self.collection_prefix);
        self.store.upsert(&collection, points).await?;
        tracing::debug!(
            doc_id = %doc_id,
            collection = %collection,
            points = count,
            "indexed document"
        );
        Ok(count)
    }
}

fn chunk_point_id(doc_id: &str, chunk: usize) -> String {
    uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_OID,
        format!("{doc_id}/{chunk}").as_bytes(),
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_store::InMemoryVectorStore;

    fn ingestor() -> (Ingestor, Arc<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new());
        let ingestor = Ingestor::new(Arc::clone(&store) as Arc<dyn VectorStore>, "sift".into(), 3);
        (ingestor, store)
    }

    fn meta(user: &str, ts: i64) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("user_id".to_owned(), serde_json::json!(user)),
            ("timestamp".to_owned(), serde_json::json!(ts)),
        ])
    }

    #[tokio::test]
    async fn indexes_chunks_into_modality_collection() {
        let (ingestor, store) = ingestor();
        ingestor.ensure_collections().await.unwrap();

        let written = ingestor
            .index(IngestRecord {
                doc_id: "notes.md".into(),
                modality: Modality::Text,
                vectors: vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
                metadatas: vec![meta("u1", 100), meta("u1", 100)],
            })
            .await
            .unwrap();
        assert_eq!(written, 2);

        let results = store
            .search("sift_text", vec![1.0, 0.0, 0.0], 10, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].payload.get("doc_id").unwrap(),
            &serde_json::json!("notes.md")
        );
    }

    #[tokio::test]
    async fn reingest_overwrites_instead_of_duplicating() {
        let (ingestor, store) = ingestor();
        ingestor.ensure_collections().await.unwrap();

        let record = IngestRecord {
            doc_id: "doc".into(),
            modality: Modality::Text,
            vectors: vec![vec![1.0, 0.0, 0.0]],
            metadatas: vec![meta("u1", 100)],
        };
        ingestor.index(record.clone()).await.unwrap();
        ingestor.index(record).await.unwrap();

        let results = store
            .search("sift_text", vec![1.0, 0.0, 0.0], 10, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn mismatched_counts_rejected() {
        let (ingestor, _) = ingestor();
        ingestor.ensure_collections().await.unwrap();

        let result = ingestor
            .index(IngestRecord {
                doc_id: "doc".into(),
                modality: Modality::Text,
                vectors: vec![vec![1.0, 0.0, 0.0]],
                metadatas: vec![],
            })
            .await;
        assert!(matches!(result, Err(IndexError::Ingest(_))));
    }

    #[tokio::test]
    async fn wrong_dimension_rejected() {
        let (ingestor, _) = ingestor();
        ingestor.ensure_collections().await.unwrap();

        let result = ingestor
            .index(IngestRecord {
                doc_id: "doc".into(),
                modality: Modality::Screen,
                vectors: vec![vec![1.0, 0.0]],
                metadatas: vec![meta("u1", 1)],
            })
            .await;
        assert!(matches!(result, Err(IndexError::Ingest(_))));
    }

    #[test]
    fn point_ids_are_stable() {
        assert_eq!(chunk_point_id("doc", 0), chunk_point_id("doc", 0));
        assert_ne!(chunk_point_id("doc", 0), chunk_point_id("doc", 1));
    }
}
