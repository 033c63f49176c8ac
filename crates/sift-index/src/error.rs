#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector store error: {0}")]
    VectorStore(#[from] crate::vector_store::VectorStoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] sift_llm::LlmError),

    #[error("answer synthesis failed: {0}")]
    Synthesis(String),

    #[error("invalid redaction pattern '{pattern}': {reason}")]
    RedactionPattern { pattern: String, reason: String },

    #[error("ingest rejected: {0}")]
    Ingest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    /// Whether the caller may retry the same request later.
    ///
    /// Only synthesis-backend failures qualify; everything else either
    /// degrades inside the pipeline or is a caller bug.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Synthesis(_))
    }
}
