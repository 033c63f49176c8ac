use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use sift_llm::{LlmProvider, Message, Role};

use crate::registry::ToolSpec;
use crate::state::{ToolChoice, ToolPlan};

#[derive(Debug, Deserialize, JsonSchema)]
struct PlanOutput {
    /// Tools to invoke, in execution order. Empty when none are needed.
    tools: Vec<PlanChoice>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PlanChoice {
    tool: String,
    #[serde(default)]
    arguments: serde_json::Value,
    #[serde(default = "default_choice_confidence")]
    confidence: f32,
}

fn default_choice_confidence() -> f32 {
    0.5
}

/// Picks an ordered subset of the chosen agent's tools for one request.
/// Scoped strictly to that agent's registrations; an empty plan is a valid
/// outcome meaning "answer directly".
pub struct ToolSelector<P> {
    provider: Arc<P>,
    timeout: Duration,
}

impl<P> std::fmt::Debug for ToolSelector<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSelector")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> ToolSelector<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Select tools for the message from the agent's declared set.
    ///
    /// Unknown tool ids are dropped; tools declaring `requires_network` are
    /// dropped when `offline` is set. Malformed model output degrades to an
    /// empty plan, never an error.
    pub async fn select(&self, message: &str, tools: &[ToolSpec], offline: bool) -> ToolPlan {
        if tools.is_empty() {
            return ToolPlan::default();
        }

        let messages = build_prompt(message, tools);
        let model_call = self.provider.chat_typed::<PlanOutput>(&messages);
        let out = match tokio::time::timeout(self.timeout, model_call).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                tracing::warn!("tool selection failed ({e}), answering without tools");
                return ToolPlan::default();
            }
            Err(_) => {
                tracing::warn!("tool selection timed out, answering without tools");
                return ToolPlan::default();
            }
        };

        let choices = out
            .tools
            .into_iter()
            .filter_map(|choice| {
                let Some(spec) = tools.iter().find(|t| t.id == choice.tool) else {
                    tracing::warn!("selector chose undeclared tool '{}', dropped", choice.tool);
                    return None;
                };
                if offline && spec.requires_network {
                    tracing::warn!(
                        "tool '{}' requires network but agent is offline, dropped",
                        spec.id
                    );
                    return None;
                }
                Some(ToolChoice {
                    tool: choice.tool,
                    arguments: choice.arguments,
                    confidence: if choice.confidence.is_finite() {
                        choice.confidence.clamp(0.0, 1.0)
                    } else {
                        0.0
                    },
                })
            })
            .collect();

        ToolPlan { choices }
    }
}

fn build_prompt(message: &str, tools: &[ToolSpec]) -> Vec<Message> {
    let mut tool_list = String::new();
    for t in tools {
        let _ = write!(tool_list, "- {}: {}", t.id, t.description);
        if t.requires_network {
            let _ = write!(tool_list, " (requires network)");
        }
        tool_list.push('\n');
    }
    let system = format!(
        "Select which of these tools to run for the user's request, in \
         order. Select none when the request can be answered directly.\n\
         Tools:\n{tool_list}\
         Respond with JSON only: {}",
        sift_llm::provider::schema_text::<PlanOutput>(),
    );
    vec![
        Message::text(Role::System, system),
        Message::text(Role::User, message),
    ]
}
