use std::sync::Arc;

use serde::Serialize;
use sift_index::{Evidence, Redactor};
use sift_llm::LlmProvider;
use uuid::Uuid;

use crate::classifier::IntentClassifier;
use crate::error::EngineError;
use crate::registry::{BoxFuture, CapabilityRegistry};
use crate::selector::ToolSelector;
use crate::state::{Classification, Request, RequestState, Stage, ToolOutcome};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Below this classification confidence, requests route to
    /// `default_agent` instead of the top-scored one.
    pub confidence_threshold: f32,
    pub default_agent: String,
    /// When set, tools declaring `requires_network` are never selected.
    pub offline: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            default_agent: "recall".into(),
            offline: false,
        }
    }
}

/// What the caller gets back for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub request_id: Uuid,
    /// Agent that produced the answer.
    pub agent: String,
    pub answer: String,
    pub evidence: Vec<Evidence>,
    /// Evidence identifiers the answer relied on.
    pub cited: Vec<String>,
    pub tool_results: Vec<ToolOutcome>,
    pub degradations: Vec<String>,
    pub stage: Stage,
}

/// The workflow engine. Drives one request strictly forward through
/// `RECEIVED → CLASSIFIED → TOOLS_SELECTED → EXECUTED → RESPONDED`,
/// invoking each stage exactly once; any stage failure short-circuits to
/// the terminal `FAILED` outcome instead.
pub struct Supervisor<P> {
    registry: Arc<CapabilityRegistry>,
    classifier: IntentClassifier<P>,
    selector: ToolSelector<P>,
    redactor: Redactor,
    cfg: SupervisorConfig,
}

impl<P> std::fmt::Debug for Supervisor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("registry", &self.registry)
            .field("default_agent", &self.cfg.default_agent)
            .field("confidence_threshold", &self.cfg.confidence_threshold)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> Supervisor<P> {
    /// Build the engine over a fully populated registry.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` when the registry is empty or the
    /// configured default agent is not registered; both would otherwise
    /// surface mid-request, which is too late for a programmer error.
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        classifier: IntentClassifier<P>,
        selector: ToolSelector<P>,
        cfg: SupervisorConfig,
    ) -> Result<Self, EngineError> {
        if registry.agents().is_empty() {
            return Err(EngineError::Config("no agents registered".into()));
        }
        if !registry.has_agent(&cfg.default_agent) {
            return Err(EngineError::Config(format!(
                "default agent '{}' is not registered",
                cfg.default_agent
            )));
        }
        Ok(Self {
            registry,
            classifier,
            selector,
            redactor: Redactor::new(),
            cfg,
        })
    }

    #[must_use]
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Process one request to a terminal stage.
    ///
    /// # Errors
    ///
    /// An `Err` is the `FAILED` terminal outcome, carrying the error class.
    /// Recoverable conditions (classifier fallback, tool failures, degraded
    /// retrieval) never surface here; they are recorded in the response's
    /// `degradations` and `tool_results` instead.
    pub async fn run(&self, request: Request) -> Result<Response, EngineError> {
        let mut state = RequestState::new(request);
        tracing::debug!(request_id = %state.id, "request received");

        // RECEIVED → CLASSIFIED
        let available = self.registry.agents();
        let classification = self.classifier.classify(&state.message, &available).await;
        let routed = self.route(&classification, &mut state);
        state.classification = Some(classification);
        state.stage = Stage::Classified;

        // CLASSIFIED → TOOLS_SELECTED
        let tools = self.registry.tools_for(&routed);
        let plan = self
            .selector
            .select(&state.message, &tools, self.cfg.offline)
            .await;
        tracing::debug!(
            request_id = %state.id,
            agent = %routed,
            tools = plan.choices.len(),
            "tools selected"
        );
        state.tool_plan = Some(plan.clone());
        state.stage = Stage::ToolsSelected;

        // TOOLS_SELECTED → EXECUTED. Tool failures become partial-result
        // markers; only the agent itself can fail the request.
        for choice in plan.choices {
            let tool = match self.registry.resolve_tool(&routed, &choice.tool) {
                Ok(tool) => tool,
                Err(e) => {
                    state
                        .tool_results
                        .push(ToolOutcome::failed(&choice.tool, e.to_string()));
                    state.degradations.push(format!("tool:{}: {e}", choice.tool));
                    continue;
                }
            };
            let tool_id = choice.tool.clone();
            state.active_tool = Some(choice);
            if let Err(e) = tool.process(&mut state).await {
                tracing::warn!(request_id = %state.id, "tool '{tool_id}' failed: {e}");
                state
                    .tool_results
                    .push(ToolOutcome::failed(&tool_id, e.to_string()));
                state.degradations.push(format!("tool:{tool_id}: {e}"));
            }
            state.active_tool = None;
        }

        let agent = match self.registry.resolve_agent(&routed) {
            Ok(agent) => agent,
            Err(e) => return Self::fail(&mut state, e),
        };
        if let Err(e) = agent.process(&mut state).await {
            return Self::fail(&mut state, e);
        }
        state.stage = Stage::Executed;

        // EXECUTED → RESPONDED
        let answer = state.answer.take().unwrap_or_default();
        let answer = self.redactor.redact(&answer).into_owned();
        state.stage = Stage::Responded;
        tracing::debug!(request_id = %state.id, agent = %routed, "request responded");

        Ok(Response {
            request_id: state.id,
            agent: routed,
            answer,
            evidence: state.evidence,
            cited: state.cited,
            tool_results: state.tool_results,
            degradations: state.degradations,
            stage: Stage::Responded,
        })
    }

    /// Deterministic routing: the classified agent when confidence clears
    /// the threshold, the configured default otherwise. The fallback is a
    /// policy outcome, not an error.
    fn route(&self, classification: &Classification, state: &mut RequestState) -> String {
        if classification.confidence < self.cfg.confidence_threshold {
            tracing::info!(
                request_id = %state.id,
                confidence = classification.confidence,
                threshold = self.cfg.confidence_threshold,
                chosen = %classification.agent,
                fallback = %self.cfg.default_agent,
                "confidence below threshold, routing to default agent"
            );
            state.degradations.push(format!(
                "routing_fallback: confidence {:.2} below {:.2}",
                classification.confidence, self.cfg.confidence_threshold
            ));
            self.cfg.default_agent.clone()
        } else {
            classification.agent.clone()
        }
    }

    fn fail(state: &mut RequestState, e: EngineError) -> Result<Response, EngineError> {
        state.stage = Stage::Failed;
        tracing::warn!(request_id = %state.id, "request failed: {e}");
        Err(e)
    }
}

/// Type-erased handle for callers that should not be generic over the
/// provider, such as the HTTP gateway.
pub trait QueryService: Send + Sync {
    fn run(&self, request: Request) -> BoxFuture<'_, Result<Response, EngineError>>;
}

impl<P: LlmProvider + 'static> QueryService for Supervisor<P> {
    fn run(&self, request: Request) -> BoxFuture<'_, Result<Response, EngineError>> {
        Box::pin(Supervisor::run(self, request))
    }
}
