use sift_index::IndexError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A capability id was registered twice. Startup programmer error.
    #[error("duplicate capability id: {0}")]
    Conflict(String),

    /// A capability id could not be resolved. Startup programmer error.
    #[error("unknown capability: {0}")]
    NotFound(String),

    /// A selected tool raised. Recorded as a partial-result marker by the
    /// supervisor; does not abort the request on its own.
    #[error("tool execution failed: {0}")]
    Tool(String),

    /// The generation backend is unreachable. Surfaced to the caller as
    /// retryable; no partial answer is fabricated in its place.
    #[error("answer synthesis failed: {0}")]
    Synthesis(String),

    /// Retrieval-side failure that could not degrade gracefully.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Synthesis(_))
    }
}

impl From<IndexError> for EngineError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Synthesis(msg) => Self::Synthesis(msg),
            other => Self::Retrieval(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_maps_to_retryable() {
        let err = EngineError::from(IndexError::Synthesis("down".into()));
        assert!(matches!(err, EngineError::Synthesis(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn other_index_errors_map_to_retrieval() {
        let err = EngineError::from(IndexError::Ingest("bad".into()));
        assert!(matches!(err, EngineError::Retrieval(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn conflict_not_retryable() {
        assert!(!EngineError::Conflict("recall".into()).is_retryable());
    }
}
