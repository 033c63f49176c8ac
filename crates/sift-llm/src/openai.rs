use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, MessagePart, Role};
use crate::retry::send_with_retry;

const MAX_RETRIES: u32 = 3;

/// Provider for any OpenAI-compatible `/chat/completions` + `/embeddings` API
/// (OpenAI, Ollama's compat endpoint, vLLM, llama.cpp server, ...).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    embedding_model: Option<String>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl Clone for OpenAiProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            embedding_model: self.embedding_model.clone(),
        }
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        max_tokens: u32,
        embedding_model: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url,
            model,
            max_tokens,
            embedding_model,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Use a different chat model, keeping the connection settings. Used to
    /// point vision-conditioned calls at a VLM on the same endpoint.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn send_request(&self, messages: &[Message]) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = if has_image_parts(messages) {
            serde_json::to_value(ChatRequest {
                model: &self.model,
                messages: convert_messages_vision(messages),
                max_tokens: self.max_tokens,
            })?
        } else {
            serde_json::to_value(ChatRequest {
                model: &self.model,
                messages: convert_messages(messages),
                max_tokens: self.max_tokens,
            })?
        };

        let response = send_with_retry("openai", MAX_RETRIES, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!("OpenAI API error {status}: {text}");
            return Err(LlmError::Other(format!(
                "OpenAI API request failed (status {status})"
            )));
        }

        let resp: OpenAiChatResponse = serde_json::from_str(&text)?;
        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyResponse {
                provider: "openai".into(),
            })
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.send_request(messages).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let Some(ref model) = self.embedding_model else {
            return Err(LlmError::EmbedUnsupported {
                provider: "openai".into(),
            });
        };

        let body = EmbeddingRequest { model, input: text };
        let response = send_with_retry("openai", MAX_RETRIES, || {
            self.client
                .post(format!("{}/embeddings", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!("OpenAI embeddings error {status}: {text}");
            return Err(LlmError::Other(format!(
                "OpenAI embeddings request failed (status {status})"
            )));
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse {
                provider: "openai".into(),
            })
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a, M: Serialize> {
    model: &'a str,
    messages: M,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct VisionMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrlDetail },
}

#[derive(Serialize)]
struct ImageUrlDetail {
    url: String,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn has_image_parts(messages: &[Message]) -> bool {
    messages.iter().any(Message::has_images)
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: role_str(m.role),
            content: &m.content,
        })
        .collect()
}

fn convert_messages_vision(messages: &[Message]) -> Vec<VisionMessage<'_>> {
    messages
        .iter()
        .map(|m| {
            let mut parts = Vec::new();
            if !m.content.is_empty() {
                parts.push(ContentPart::Text { text: &m.content });
            }
            for part in &m.parts {
                let MessagePart::Image { data, mime_type } = part;
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrlDetail {
                        url: format!("data:{mime_type};base64,{data}"),
                    },
                });
            }
            if parts.is_empty() {
                parts.push(ContentPart::Text { text: "" });
            }
            VisionMessage {
                role: role_str(m.role),
                content: parts,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> OpenAiProvider {
        OpenAiProvider::new(
            "key".into(),
            "https://api.example.com/v1/".into(),
            "gpt-4o-mini".into(),
            1024,
            Some("text-embedding-3-small".into()),
        )
    }

    #[test]
    fn trailing_slashes_stripped_from_base_url() {
        let p = test_provider();
        assert_eq!(p.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn supports_embeddings_with_model() {
        assert!(test_provider().supports_embeddings());
    }

    #[test]
    fn no_embedding_model_means_unsupported() {
        let p = OpenAiProvider::new("k".into(), "http://x".into(), "m".into(), 256, None);
        assert!(!p.supports_embeddings());
    }

    #[tokio::test]
    async fn embed_without_model_errors() {
        let p = OpenAiProvider::new("k".into(), "http://x".into(), "m".into(), 256, None);
        let result = p.embed("text").await;
        assert!(matches!(result, Err(LlmError::EmbedUnsupported { .. })));
    }

    #[test]
    fn debug_redacts_api_key() {
        let p = test_provider();
        let dbg = format!("{p:?}");
        assert!(!dbg.contains("key\""));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn with_model_switches_chat_model() {
        let p = test_provider().with_model("gpt-4o");
        assert_eq!(p.model, "gpt-4o");
    }

    #[test]
    fn convert_messages_maps_roles() {
        let msgs = vec![
            Message::text(Role::System, "sys"),
            Message::text(Role::User, "hi"),
        ];
        let api = convert_messages(&msgs);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[1].content, "hi");
    }

    #[test]
    fn has_image_parts_detects_image() {
        let with_image = Message::with_parts(
            Role::User,
            "describe",
            vec![MessagePart::Image {
                data: "aGk=".into(),
                mime_type: "image/png".into(),
            }],
        );
        let text_only = Message::text(Role::User, "plain");
        assert!(has_image_parts(&[with_image]));
        assert!(!has_image_parts(&[text_only]));
        assert!(!has_image_parts(&[]));
    }

    #[test]
    fn vision_conversion_builds_data_url() {
        let msg = Message::with_parts(
            Role::User,
            "describe",
            vec![MessagePart::Image {
                data: "aGk=".into(),
                mime_type: "image/jpeg".into(),
            }],
        );
        let messages = [msg];
        let converted = convert_messages_vision(&messages);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].content.len(), 2);
        match &converted[0].content[1] {
            ContentPart::ImageUrl { image_url } => {
                assert_eq!(image_url.url, "data:image/jpeg;base64,aGk=");
            }
            ContentPart::Text { .. } => panic!("expected image part"),
        }
    }

    #[test]
    fn vision_request_serializes_tagged_parts() {
        let msg = Message::with_parts(
            Role::User,
            "q",
            vec![MessagePart::Image {
                data: "eA==".into(),
                mime_type: "image/png".into(),
            }],
        );
        let body = serde_json::to_value(ChatRequest {
            model: "vlm",
            messages: convert_messages_vision(&[msg]),
            max_tokens: 64,
        })
        .unwrap();
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][0]["content"][1]["type"], "image_url");
    }

    #[test]
    fn chat_response_parses() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let resp: OpenAiChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.choices[0].message.content, "hello");
    }

    #[test]
    fn embedding_response_parses() {
        let json = r#"{"data":[{"embedding":[0.1,0.2,0.3]}]}"#;
        let resp: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].embedding.len(), 3);
    }
}
