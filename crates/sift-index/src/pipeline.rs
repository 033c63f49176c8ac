use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sift_llm::LlmProvider;

use crate::error::IndexError;
use crate::redact::Redactor;
use crate::rerank::Reranker;
use crate::synthesize::{Synthesis, Synthesizer};
use crate::types::{Evidence, Modality, Provenance, QueryFilters};
use crate::vector_store::{
    FieldCondition, FieldValue, RangeCondition, ScoredVectorPoint, VectorFilter, VectorStore,
};

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub collection_prefix: String,
    /// Per-collection candidate count before fusion.
    pub k_candidates: u64,
    /// Size of the fused shortlist.
    pub k_final: usize,
    pub rerank_enabled: bool,
    pub embed_timeout: Duration,
    pub search_timeout: Duration,
    pub rerank_timeout: Duration,
    pub synthesis_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection_prefix: "sift".into(),
            k_candidates: 40,
            k_final: 10,
            rerank_enabled: true,
            embed_timeout: Duration::from_secs(15),
            search_timeout: Duration::from_secs(10),
            rerank_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(60),
        }
    }
}

/// Final product of one retrieval query.
#[derive(Debug, Clone)]
pub struct Answered {
    pub answer: String,
    pub cited: Vec<String>,
    pub evidence: Vec<Evidence>,
    /// Human-readable markers for every degraded step, for observability.
    pub degraded: Vec<String>,
}

/// Embed → search each modality concurrently → fuse → conditional rerank →
/// redact → synthesize. Single-collection failures and timeouts degrade to
/// reduced evidence; only synthesis failure aborts the query.
pub struct RetrievalPipeline<P, R> {
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    synthesizer: Synthesizer<P>,
    reranker: Option<R>,
    redactor: Redactor,
    cfg: RetrievalConfig,
}

impl<P, R> std::fmt::Debug for RetrievalPipeline<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPipeline")
            .field("rerank_enabled", &self.cfg.rerank_enabled)
            .field("k_candidates", &self.cfg.k_candidates)
            .field("k_final", &self.cfg.k_final)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider, R: Reranker> RetrievalPipeline<P, R> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        synthesizer: Synthesizer<P>,
        cfg: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            store,
            synthesizer,
            reranker: None,
            redactor: Redactor::new(),
            cfg,
        }
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: R) -> Self {
        self.reranker = Some(reranker);
        self
    }

    #[must_use]
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Retrieve the fused, reranked, redacted shortlist for a question.
    ///
    /// Never fails: every degraded step contributes an empty result and a
    /// marker in the returned list instead.
    pub async fn search_evidence(
        &self,
        question: &str,
        user_id: &str,
        filters: &QueryFilters,
    ) -> (Vec<Evidence>, Vec<String>) {
        let mut degraded = Vec::new();

        let vector = match tokio::time::timeout(
            self.cfg.embed_timeout,
            self.provider.embed(question),
        )
        .await
        {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                tracing::warn!("query embedding failed: {e}");
                degraded.push(format!("embed: {e}"));
                return (Vec::new(), degraded);
            }
            Err(_) => {
                tracing::warn!("query embedding timed out");
                degraded.push("embed: timeout".into());
                return (Vec::new(), degraded);
            }
        };

        // The three collections are independent; a slow one must not hold
        // up the others, so each search carries its own timeout.
        let (text, image, screen) = tokio::join!(
            self.search_modality(Modality::Text, &vector, user_id, filters),
            self.search_modality(Modality::Image, &vector, user_id, filters),
            self.search_modality(Modality::Screen, &vector, user_id, filters),
        );

        let mut per_modality = Vec::with_capacity(3);
        for (list, marker) in [text, image, screen] {
            if let Some(marker) = marker {
                degraded.push(marker);
            }
            per_modality.push(list);
        }

        let mut fused = crate::fusion::fuse(per_modality, self.cfg.k_final);

        if let Some(marker) = self.rerank_images(question, &mut fused).await {
            degraded.push(marker);
        }

        for e in &mut fused {
            if let std::borrow::Cow::Owned(masked) = self.redactor.redact(&e.snippet) {
                e.snippet = masked;
            }
        }

        (fused, degraded)
    }

    /// Synthesize a grounded answer from already-retrieved evidence. The
    /// answer passes the redaction filter before it is returned.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Synthesis` when the generation backend is
    /// unreachable or times out; no partial answer is fabricated.
    pub async fn answer_from(
        &self,
        question: &str,
        evidence: &[Evidence],
    ) -> Result<Synthesis, IndexError> {
        let synth = self.synthesizer.synthesize(question, evidence);
        let Synthesis { answer, cited } =
            match tokio::time::timeout(self.cfg.synthesis_timeout, synth).await {
                Ok(result) => result?,
                Err(_) => return Err(IndexError::Synthesis("timeout".into())),
            };
        Ok(Synthesis {
            answer: self.redactor.redact(&answer).into_owned(),
            cited,
        })
    }

    /// Full query path: retrieve evidence, then synthesize a grounded answer.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Synthesis` when the generation backend is
    /// unreachable; retrieval-side failures degrade instead.
    pub async fn retrieve_and_answer(
        &self,
        question: &str,
        user_id: &str,
        filters: &QueryFilters,
    ) -> Result<Answered, IndexError> {
        let (evidence, degraded) = self.search_evidence(question, user_id, filters).await;
        let Synthesis { answer, cited } = self.answer_from(question, &evidence).await?;

        Ok(Answered {
            answer,
            cited,
            evidence,
            degraded,
        })
    }

    async fn search_modality(
        &self,
        modality: Modality,
        vector: &[f32],
        user_id: &str,
        filters: &QueryFilters,
    ) -> (Vec<Evidence>, Option<String>) {
        if !filters.allows(modality) {
            return (Vec::new(), None);
        }

        let mut filter = VectorFilter {
            must: vec![FieldCondition {
                field: "user_id".into(),
                value: FieldValue::Text(user_id.into()),
            }],
            ranges: Vec::new(),
        };
        if let Some(range) = filters.time_range {
            filter.ranges.push(RangeCondition {
                field: "timestamp".into(),
                gte: Some(range.start),
                lte: Some(range.end),
            });
        }

        let collection = modality.collection(&self.cfg.collection_prefix);
        let search = self.store.search(
            &collection,
            vector.to_vec(),
            self.cfg.k_candidates,
            Some(filter),
        );
        match tokio::time::timeout(self.cfg.search_timeout, search).await {
            Ok(Ok(points)) => (
                points
                    .into_iter()
                    .map(|p| evidence_from_point(modality, p))
                    .collect(),
                None,
            ),
            Ok(Err(e)) => {
                tracing::warn!("search in {collection} failed: {e}");
                (Vec::new(), Some(format!("search:{modality}: {e}")))
            }
            Err(_) => {
                tracing::warn!("search in {collection} timed out");
                (Vec::new(), Some(format!("search:{modality}: timeout")))
            }
        }
    }

    /// Re-score image candidates when any are present; skipped entirely for
    /// text-only shortlists. A failed or timed-out reranker keeps the fused
    /// order.
    async fn rerank_images(&self, question: &str, fused: &mut [Evidence]) -> Option<String> {
        if !self.cfg.rerank_enabled {
            return None;
        }
        let reranker = self.reranker.as_ref()?;
        let image_idx: Vec<usize> = fused
            .iter()
            .enumerate()
            .filter(|(_, e)| e.modality == Modality::Image)
            .map(|(i, _)| i)
            .collect();
        if image_idx.is_empty() {
            return None;
        }

        let candidates: Vec<Evidence> = image_idx.iter().map(|&i| fused[i].clone()).collect();
        let scores = match tokio::time::timeout(
            self.cfg.rerank_timeout,
            reranker.rerank(question, &candidates),
        )
        .await
        {
            Ok(Ok(scores)) if scores.len() == candidates.len() => scores,
            Ok(Ok(scores)) => {
                tracing::warn!(
                    "reranker returned {} scores for {} candidates, keeping fused order",
                    scores.len(),
                    candidates.len()
                );
                return Some("rerank: score count mismatch".into());
            }
            Ok(Err(e)) => {
                tracing::warn!("rerank failed, keeping fused order: {e}");
                return Some(format!("rerank: {e}"));
            }
            Err(_) => {
                tracing::warn!("rerank timed out, keeping fused order");
                return Some("rerank: timeout".into());
            }
        };

        for (&i, score) in image_idx.iter().zip(scores) {
            fused[i].rerank_score = Some(score);
        }
        fused.sort_by(|a, b| {
            b.effective_score()
                .partial_cmp(&a.effective_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        None
    }
}

fn evidence_from_point(modality: Modality, point: ScoredVectorPoint) -> Evidence {
    let p = &point.payload;
    Evidence {
        doc_id: str_field(p, "doc_id").unwrap_or_else(|| point.id.clone()),
        modality,
        snippet: str_field(p, "snippet").unwrap_or_default(),
        score: point.score,
        rerank_score: None,
        provenance: Provenance {
            path: str_field(p, "path"),
            url: str_field(p, "url"),
            page: p
                .get("page")
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok()),
            bbox: p.get("bbox").and_then(parse_bbox),
            timestamp: p.get("timestamp").and_then(serde_json::Value::as_i64),
        },
        image_data: str_field(p, "image_b64"),
    }
}

fn str_field(payload: &HashMap<String, serde_json::Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

#[expect(clippy::cast_possible_truncation)]
fn parse_bbox(value: &serde_json::Value) -> Option<[f32; 4]> {
    let values: Vec<f32> = value
        .as_array()?
        .iter()
        .filter_map(|x| x.as_f64().map(|f| f as f32))
        .collect();
    values.try_into().ok()
}
