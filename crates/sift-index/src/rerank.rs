use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use sift_llm::{LlmProvider, Message, MessagePart, Role};

use crate::error::IndexError;
use crate::types::Evidence;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Second-pass scorer for image-bearing candidates. Implementations return
/// one score in [0, 1] per input candidate, in order.
pub trait Reranker: Send + Sync {
    fn rerank<'a>(
        &'a self,
        question: &'a str,
        candidates: &'a [Evidence],
    ) -> BoxFuture<'a, Result<Vec<f32>, IndexError>>;
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RerankOutput {
    /// Relevance of each image to the question, 0-100, in input order.
    scores: Vec<f32>,
}

/// Reranks by showing the VLM the question alongside every candidate image
/// in a single call and asking for per-image relevance scores.
pub struct VlmReranker<P> {
    provider: Arc<P>,
}

impl<P> std::fmt::Debug for VlmReranker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VlmReranker").finish_non_exhaustive()
    }
}

impl<P: LlmProvider> VlmReranker<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    async fn score(&self, question: &str, candidates: &[Evidence]) -> Result<Vec<f32>, IndexError> {
        let parts: Vec<MessagePart> = candidates
            .iter()
            .filter_map(|c| {
                c.image_data.as_ref().map(|data| MessagePart::Image {
                    data: data.clone(),
                    mime_type: "image/jpeg".into(),
                })
            })
            .collect();

        let prompt = format!(
            "Rate how relevant each of the {} attached images is to answering \
             this question, as an integer 0-100 per image in attachment order.\n\
             Question: {question}\n\
             Respond with JSON only: {}",
            candidates.len(),
            sift_llm::provider::schema_text::<RerankOutput>(),
        );
        let messages = vec![Message::with_parts(Role::User, prompt, parts)];

        let out: RerankOutput = self.provider.chat_typed(&messages).await?;
        if out.scores.len() != candidates.len() {
            return Err(IndexError::Synthesis(format!(
                "reranker returned {} scores for {} candidates",
                out.scores.len(),
                candidates.len()
            )));
        }
        Ok(out
            .scores
            .into_iter()
            .map(|s| (s / 100.0).clamp(0.0, 1.0))
            .collect())
    }
}

impl<P: LlmProvider + 'static> Reranker for VlmReranker<P> {
    fn rerank<'a>(
        &'a self,
        question: &'a str,
        candidates: &'a [Evidence],
    ) -> BoxFuture<'a, Result<Vec<f32>, IndexError>> {
        Box::pin(self.score(question, candidates))
    }
}
