#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable")]
    Unavailable,

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("structured output parse failed: {0}")]
    StructuredParse(String),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether retrying the same call later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimited | Self::Unavailable | Self::EmptyResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_transient() {
        assert!(LlmError::RateLimited.is_transient());
        assert!(LlmError::Unavailable.is_transient());
    }

    #[test]
    fn parse_failures_are_not_transient() {
        assert!(!LlmError::StructuredParse("bad shape".into()).is_transient());
        assert!(!LlmError::Other("boom".into()).is_transient());
    }

    #[test]
    fn display_includes_provider() {
        let err = LlmError::EmptyResponse {
            provider: "openai".into(),
        };
        assert!(err.to_string().contains("openai"));
    }
}
