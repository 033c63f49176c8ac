//! Test-only mock LLM provider.

use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub embedding: Vec<f32>,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            embedding: vec![0.0; 8],
            supports_embeddings: true,
            fail_chat: false,
            fail_embed: false,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    #[must_use]
    pub fn with_failing_chat(mut self) -> Self {
        self.fail_chat = true;
        self
    }

    #[must_use]
    pub fn with_failing_embed(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_chat {
            return Err(LlmError::Unavailable);
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_embed {
            return Err(LlmError::Unavailable);
        }
        if self.supports_embeddings {
            Ok(self.embedding.clone())
        } else {
            Err(LlmError::EmbedUnsupported {
                provider: "mock".into(),
            })
        }
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;

    #[tokio::test]
    async fn default_response_when_queue_empty() {
        let mock = MockProvider::default();
        let msgs = vec![Message::text(Role::User, "hi")];
        assert_eq!(mock.chat(&msgs).await.unwrap(), "mock response");
    }

    #[tokio::test]
    async fn queued_responses_consumed_in_order() {
        let mock = MockProvider::with_responses(vec!["one".into(), "two".into()]);
        let msgs = vec![Message::text(Role::User, "hi")];
        assert_eq!(mock.chat(&msgs).await.unwrap(), "one");
        assert_eq!(mock.chat(&msgs).await.unwrap(), "two");
        assert_eq!(mock.chat(&msgs).await.unwrap(), "mock response");
    }

    #[tokio::test]
    async fn failing_mock_errors() {
        let mock = MockProvider::failing();
        let msgs = vec![Message::text(Role::User, "hi")];
        assert!(mock.chat(&msgs).await.is_err());
        assert!(mock.embed("x").await.is_err());
    }

    #[tokio::test]
    async fn chat_typed_parses_queued_json() {
        #[derive(Debug, serde::Deserialize, schemars::JsonSchema, PartialEq)]
        struct Out {
            value: String,
        }
        let mock = MockProvider::with_responses(vec![r#"{"value": "typed"}"#.into()]);
        let msgs = vec![Message::text(Role::User, "hi")];
        let out: Out = mock.chat_typed(&msgs).await.unwrap();
        assert_eq!(out.value, "typed");
    }

    #[tokio::test]
    async fn embed_returns_configured_vector() {
        let mock = MockProvider::default().with_embedding(vec![1.0, 0.0]);
        assert_eq!(mock.embed("x").await.unwrap(), vec![1.0, 0.0]);
    }
}
