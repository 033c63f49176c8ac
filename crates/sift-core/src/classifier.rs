use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use sift_llm::{LlmProvider, Message, Role};

use crate::registry::AgentInfo;
use crate::state::{Classification, ClassifierOrigin};

#[derive(Debug, Deserialize, JsonSchema)]
struct IntentOutput {
    /// Id of the best-suited agent, from the provided list.
    agent: String,
    /// How confident the choice is, 0.0-1.0.
    confidence: f32,
    rationale: String,
    #[serde(default)]
    keywords: Vec<String>,
    /// One-line normalized summary of what the user wants.
    #[serde(default)]
    intent: String,
}

/// Scores a request against the live agent registry. The model decides when
/// it produces well-formed output naming a registered agent; anything else
/// falls through to a deterministic keyword-overlap scorer, so routing
/// never stalls on malformed model output.
pub struct IntentClassifier<P> {
    provider: Arc<P>,
    timeout: Duration,
}

impl<P> std::fmt::Debug for IntentClassifier<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> IntentClassifier<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Classify a message against the currently registered agents.
    ///
    /// Always returns an agent id from `available` (given a non-empty set);
    /// classification failures are recovered locally and never surface.
    pub async fn classify(&self, message: &str, available: &[AgentInfo]) -> Classification {
        let messages = build_prompt(message, available);
        let model_call = self.provider.chat_typed::<IntentOutput>(&messages);
        match tokio::time::timeout(self.timeout, model_call).await {
            Ok(Ok(out)) if available.iter().any(|a| a.id == out.agent) => Classification {
                agent: out.agent,
                confidence: clamp_confidence(out.confidence),
                rationale: out.rationale,
                keywords: out.keywords,
                intent: if out.intent.is_empty() {
                    summarize(message)
                } else {
                    out.intent
                },
                origin: ClassifierOrigin::Model,
            },
            Ok(Ok(out)) => {
                tracing::warn!(
                    "classifier chose unregistered agent '{}', using keyword fallback",
                    out.agent
                );
                keyword_classify(message, available)
            }
            Ok(Err(e)) => {
                tracing::warn!("classifier model call failed ({e}), using keyword fallback");
                keyword_classify(message, available)
            }
            Err(_) => {
                tracing::warn!("classifier model call timed out, using keyword fallback");
                keyword_classify(message, available)
            }
        }
    }
}

fn build_prompt(message: &str, available: &[AgentInfo]) -> Vec<Message> {
    let mut agent_list = String::new();
    for a in available {
        let _ = writeln!(agent_list, "- {}: {}", a.id, a.description);
    }
    let system = format!(
        "You route user requests to one of these agents:\n{agent_list}\
         Pick the single best agent for the message, extract its main \
         keywords, and summarize the intent in one line.\n\
         Respond with JSON only: {}",
        sift_llm::provider::schema_text::<IntentOutput>(),
    );
    vec![
        Message::text(Role::System, system),
        Message::text(Role::User, message),
    ]
}

fn clamp_confidence(c: f32) -> f32 {
    if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 }
}

fn summarize(message: &str) -> String {
    let trimmed = message.trim();
    match trimmed.char_indices().nth(120) {
        Some((idx, _)) => trimmed[..idx].to_owned(),
        None => trimmed.to_owned(),
    }
}

/// Split into lowercase alphanumeric tokens of three or more characters.
/// `BTreeSet` keeps comparisons order-independent and deterministic.
fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(str::to_owned)
        .collect()
}

/// Deterministic fallback: score each agent by keyword overlap between the
/// message and the agent's id + description.
///
/// Tie-break is documented and fixed: more matched keywords first, then the
/// longer (more specific) matched set by total character count, then
/// registration order.
fn keyword_classify(message: &str, available: &[AgentInfo]) -> Classification {
    let message_tokens = tokenize(message);

    let mut best: Option<(usize, usize, &AgentInfo, BTreeSet<String>)> = None;
    for agent in available {
        let agent_tokens = tokenize(&format!("{} {}", agent.id, agent.description));
        let matched: BTreeSet<String> = agent_tokens
            .intersection(&message_tokens)
            .cloned()
            .collect();
        let count = matched.len();
        let specificity: usize = matched.iter().map(String::len).sum();

        let better = match &best {
            None => true,
            Some((best_count, best_spec, _, _)) => {
                count > *best_count || (count == *best_count && specificity > *best_spec)
            }
        };
        if better {
            best = Some((count, specificity, agent, matched));
        }
    }

    let Some((count, _, agent, matched)) = best else {
        return Classification {
            agent: String::new(),
            confidence: 0.0,
            rationale: "no agents registered".into(),
            keywords: Vec::new(),
            intent: summarize(message),
            origin: ClassifierOrigin::KeywordFallback,
        };
    };

    #[expect(clippy::cast_precision_loss)]
    let confidence = if message_tokens.is_empty() {
        0.0
    } else {
        (count as f32 / message_tokens.len() as f32).min(1.0)
    };

    Classification {
        agent: agent.id.clone(),
        confidence,
        rationale: format!(
            "keyword overlap with '{}' description: {count} of {} message terms",
            agent.id,
            message_tokens.len()
        ),
        keywords: matched.into_iter().collect(),
        intent: summarize(message),
        origin: ClassifierOrigin::KeywordFallback,
    }
}
