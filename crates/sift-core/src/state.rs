use serde::{Deserialize, Serialize};
use sift_index::{Evidence, QueryFilters};
use uuid::Uuid;

/// One incoming user request, as received at the query boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(alias = "question")]
    pub message: String,
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub filters: Option<QueryFilters>,
    /// Free-text temporal cue ("yesterday", "last week") forwarded to the
    /// handler; resolving it into a concrete range is the caller's job.
    #[serde(default)]
    pub time_hint: Option<String>,
}

/// Workflow position. Strictly forward; `Responded` and `Failed` are the
/// only terminal stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Received,
    Classified,
    ToolsSelected,
    Executed,
    Responded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierOrigin {
    /// Shape-validated model output.
    Model,
    /// Deterministic keyword-overlap scorer.
    KeywordFallback,
}

/// Routing decision for one request. Produced once, immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub agent: String,
    /// In [0, 1].
    pub confidence: f32,
    pub rationale: String,
    pub keywords: Vec<String>,
    pub intent: String,
    pub origin: ClassifierOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoice {
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    pub confidence: f32,
}

/// Ordered tool invocations for the chosen agent. Empty means "answer
/// directly without tools".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPlan {
    pub choices: Vec<ToolChoice>,
}

impl ToolPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub success: bool,
    pub output: String,
}

impl ToolOutcome {
    #[must_use]
    pub fn ok(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            output: output.into(),
        }
    }

    #[must_use]
    pub fn failed(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            output: output.into(),
        }
    }
}

/// The single unit of work threaded through the workflow. Owned by one
/// supervisor run; each stage mutates it additively and never shares it
/// with another request.
#[derive(Debug)]
pub struct RequestState {
    pub id: Uuid,
    pub message: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub filters: QueryFilters,
    pub time_hint: Option<String>,
    pub stage: Stage,
    pub classification: Option<Classification>,
    pub tool_plan: Option<ToolPlan>,
    /// Set by the supervisor for the duration of one tool invocation so the
    /// tool can read its own arguments through the uniform contract.
    pub active_tool: Option<ToolChoice>,
    pub tool_results: Vec<ToolOutcome>,
    pub evidence: Vec<Evidence>,
    pub cited: Vec<String>,
    pub answer: Option<String>,
    /// Observability trail of every degraded step.
    pub degradations: Vec<String>,
}

impl RequestState {
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: request.message,
            user_id: request.user_id,
            session_id: request.session_id,
            filters: request.filters.unwrap_or_default(),
            time_hint: request.time_hint,
            stage: Stage::Received,
            classification: None,
            tool_plan: None,
            active_tool: None,
            tool_results: Vec::new(),
            evidence: Vec::new(),
            cited: Vec::new(),
            answer: None,
            degradations: Vec::new(),
        }
    }
}
