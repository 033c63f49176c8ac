use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Non-text content attached to a message.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessagePart {
    Image {
        /// Base64-encoded image bytes, without a data-URL prefix.
        data: String,
        mime_type: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl Message {
    #[must_use]
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            parts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parts(role: Role, content: impl Into<String>, parts: Vec<MessagePart>) -> Self {
        Self {
            role,
            content: content.into(),
            parts,
        }
    }

    #[must_use]
    pub fn has_images(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, MessagePart::Image { .. }))
    }
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant response text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Chat and parse the response into `T`.
    ///
    /// The default implementation strips markdown fences and surrounding prose
    /// before deserializing, since models routinely wrap JSON output.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::StructuredParse` when the response does not match the
    /// expected shape, or the underlying `chat` error.
    fn chat_typed<T>(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<T, LlmError>> + Send
    where
        T: DeserializeOwned + JsonSchema + 'static,
        Self: Sized,
    {
        async move {
            let raw = self.chat(messages).await?;
            parse_structured(&raw)
        }
    }

    /// Embed a text into the provider's vector space.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::EmbedUnsupported` when the provider has no embedding
    /// model configured, or a transport error.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &str;
}

/// Parse a model response into `T`, tolerating markdown fences and prose
/// around the JSON object.
///
/// # Errors
///
/// Returns `LlmError::StructuredParse` when no valid JSON for `T` is found.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let candidate = extract_json(raw);
    serde_json::from_str(candidate).map_err(|e| LlmError::StructuredParse(e.to_string()))
}

/// Narrow a response to its JSON payload: prefer a fenced block, otherwise
/// the outermost brace span, otherwise the trimmed input.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}'))
        && open < close
    {
        return &trimmed[open..=close];
    }
    trimmed
}

/// Render the JSON schema for `T` as a compact string for prompt embedding.
#[must_use]
pub fn schema_text<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string(&schema).unwrap_or_else(|_| "{}".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Shape {
        value: String,
    }

    #[test]
    fn parse_bare_json() {
        let out: Shape = parse_structured(r#"{"value": "x"}"#).unwrap();
        assert_eq!(out.value, "x");
    }

    #[test]
    fn parse_fenced_json() {
        let raw = "Here you go:\n```json\n{\"value\": \"fenced\"}\n```\nDone.";
        let out: Shape = parse_structured(raw).unwrap();
        assert_eq!(out.value, "fenced");
    }

    #[test]
    fn parse_fenced_without_language_tag() {
        let raw = "```\n{\"value\": \"plain\"}\n```";
        let out: Shape = parse_structured(raw).unwrap();
        assert_eq!(out.value, "plain");
    }

    #[test]
    fn parse_json_with_surrounding_prose() {
        let raw = "Sure! The result is {\"value\": \"inline\"} as requested.";
        let out: Shape = parse_structured(raw).unwrap();
        assert_eq!(out.value, "inline");
    }

    #[test]
    fn parse_garbage_fails() {
        let result = parse_structured::<Shape>("no json here");
        assert!(matches!(result, Err(LlmError::StructuredParse(_))));
    }

    #[test]
    fn parse_wrong_shape_fails() {
        let result = parse_structured::<Shape>(r#"{"other": 1}"#);
        assert!(matches!(result, Err(LlmError::StructuredParse(_))));
    }

    #[test]
    fn message_text_has_no_parts() {
        let msg = Message::text(Role::User, "hello");
        assert!(!msg.has_images());
        assert!(msg.parts.is_empty());
    }

    #[test]
    fn message_with_image_part() {
        let msg = Message::with_parts(
            Role::User,
            "what is this?",
            vec![MessagePart::Image {
                data: "aGVsbG8=".into(),
                mime_type: "image/png".into(),
            }],
        );
        assert!(msg.has_images());
    }

    #[test]
    fn schema_text_mentions_fields() {
        let schema = schema_text::<Shape>();
        assert!(schema.contains("value"));
    }

    #[test]
    fn message_roundtrips_through_serde() {
        let msg = Message::text(Role::Assistant, "reply");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Assistant);
        assert_eq!(back.content, "reply");
    }
}
