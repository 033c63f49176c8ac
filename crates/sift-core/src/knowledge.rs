use std::sync::Arc;

use serde::Deserialize;
use sift_index::RetrievalPipeline;
use sift_index::rerank::Reranker;
use sift_llm::LlmProvider;

use crate::error::EngineError;
use crate::registry::{BoxFuture, Capability};
use crate::state::{RequestState, ToolOutcome};

/// The knowledge-seeking agent: answers from the personal multimodal index
/// through the retrieval pipeline, grounding every answer in redacted
/// evidence.
pub struct RecallAgent<P, R> {
    pipeline: Arc<RetrievalPipeline<P, R>>,
}

impl<P, R> std::fmt::Debug for RecallAgent<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallAgent").finish_non_exhaustive()
    }
}

impl<P, R> RecallAgent<P, R> {
    #[must_use]
    pub fn new(pipeline: Arc<RetrievalPipeline<P, R>>) -> Self {
        Self { pipeline }
    }
}

impl<P, R> Capability for RecallAgent<P, R>
where
    P: LlmProvider + 'static,
    R: Reranker + 'static,
{
    fn process<'a>(
        &'a self,
        state: &'a mut RequestState,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            // A recall tool may already have populated the evidence list;
            // search only when it hasn't.
            if state.evidence.is_empty() {
                let (evidence, degraded) = self
                    .pipeline
                    .search_evidence(&state.message, &state.user_id, &state.filters)
                    .await;
                state.evidence = evidence;
                state.degradations.extend(degraded);
            }

            let synthesis = self
                .pipeline
                .answer_from(&state.message, &state.evidence)
                .await?;
            state.answer = Some(synthesis.answer);
            state.cited = synthesis.cited;
            Ok(())
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecallSearchArgs {
    /// Override for the search query; defaults to the request message.
    #[serde(default)]
    query: Option<String>,
}

/// Tool-shaped entry into the retrieval pipeline's search half: fills the
/// request's evidence list without synthesizing an answer, letting the
/// agent build on it.
pub struct RecallSearchTool<P, R> {
    pipeline: Arc<RetrievalPipeline<P, R>>,
}

impl<P, R> std::fmt::Debug for RecallSearchTool<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallSearchTool").finish_non_exhaustive()
    }
}

impl<P, R> RecallSearchTool<P, R> {
    #[must_use]
    pub fn new(pipeline: Arc<RetrievalPipeline<P, R>>) -> Self {
        Self { pipeline }
    }
}

impl<P, R> Capability for RecallSearchTool<P, R>
where
    P: LlmProvider + 'static,
    R: Reranker + 'static,
{
    fn process<'a>(
        &'a self,
        state: &'a mut RequestState,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            let args: RecallSearchArgs = state
                .active_tool
                .as_ref()
                .and_then(|c| serde_json::from_value(c.arguments.clone()).ok())
                .unwrap_or_default();
            let query = args.query.as_deref().unwrap_or(&state.message);

            let (evidence, degraded) = self
                .pipeline
                .search_evidence(query, &state.user_id, &state.filters)
                .await;
            state.degradations.extend(degraded);

            let found = evidence.len();
            for item in evidence {
                if !state.evidence.iter().any(|e| e.doc_id == item.doc_id) {
                    state.evidence.push(item);
                }
            }
            state
                .tool_results
                .push(ToolOutcome::ok("recall_search", format!("{found} candidates")));
            Ok(())
        })
    }
}
