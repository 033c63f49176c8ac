use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::EngineError;
use crate::state::RequestState;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Uniform invocation contract for agents and tools: read the request
/// state, mutate it additively, signal failure through the error.
///
/// Tools find their arguments in `state.active_tool`, placed there by the
/// supervisor for the duration of the call.
pub trait Capability: Send + Sync {
    fn process<'a>(
        &'a self,
        state: &'a mut RequestState,
    ) -> BoxFuture<'a, Result<(), EngineError>>;
}

/// Advertised identity of a registered agent, fed to the intent classifier.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub id: String,
    pub description: String,
}

/// Declared identity and constraints of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub id: String,
    pub description: String,
    /// Tools declaring this must not be selected when the owning agent is
    /// configured offline.
    pub requires_network: bool,
}

struct AgentEntry {
    description: String,
    agent: Arc<dyn Capability>,
}

struct ToolEntry {
    spec: ToolSpec,
    tool: Arc<dyn Capability>,
}

/// Process-wide capability table: agent id → agent, (agent id, tool id) →
/// tool. Populated before the first request, read-only afterward, so
/// concurrent lookups need no locking.
#[derive(Default)]
pub struct CapabilityRegistry {
    agent_order: Vec<String>,
    agents: HashMap<String, AgentEntry>,
    tool_order: HashMap<String, Vec<String>>,
    tools: HashMap<String, HashMap<String, ToolEntry>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("agents", &self.agent_order)
            .finish_non_exhaustive()
    }
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under a unique id.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Conflict` when the id is already taken;
    /// identifiers stay unique for the process lifetime rather than being
    /// silently overwritten.
    pub fn register_agent(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        agent: Arc<dyn Capability>,
    ) -> Result<(), EngineError> {
        let id = id.into();
        if self.agents.contains_key(&id) {
            return Err(EngineError::Conflict(id));
        }
        self.agent_order.push(id.clone());
        self.agents.insert(
            id,
            AgentEntry {
                description: description.into(),
                agent,
            },
        );
        Ok(())
    }

    /// Register a tool under an already-registered agent.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown agent and
    /// `EngineError::Conflict` for a duplicate tool id within that agent.
    pub fn register_tool(
        &mut self,
        agent_id: &str,
        spec: ToolSpec,
        tool: Arc<dyn Capability>,
    ) -> Result<(), EngineError> {
        if !self.agents.contains_key(agent_id) {
            return Err(EngineError::NotFound(agent_id.to_owned()));
        }
        let agent_tools = self.tools.entry(agent_id.to_owned()).or_default();
        if agent_tools.contains_key(&spec.id) {
            return Err(EngineError::Conflict(format!("{agent_id}/{}", spec.id)));
        }
        self.tool_order
            .entry(agent_id.to_owned())
            .or_default()
            .push(spec.id.clone());
        agent_tools.insert(spec.id.clone(), ToolEntry { spec, tool });
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown agent id.
    pub fn resolve_agent(&self, id: &str) -> Result<Arc<dyn Capability>, EngineError> {
        self.agents
            .get(id)
            .map(|e| Arc::clone(&e.agent))
            .ok_or_else(|| EngineError::NotFound(id.to_owned()))
    }

    /// # Errors
    ///
    /// Returns `EngineError::NotFound` when either the agent or the tool id
    /// is unknown.
    pub fn resolve_tool(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> Result<Arc<dyn Capability>, EngineError> {
        self.tools
            .get(agent_id)
            .and_then(|t| t.get(tool_id))
            .map(|e| Arc::clone(&e.tool))
            .ok_or_else(|| EngineError::NotFound(format!("{agent_id}/{tool_id}")))
    }

    #[must_use]
    pub fn has_agent(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// All registered agents, in registration order.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentInfo> {
        self.agent_order
            .iter()
            .map(|id| AgentInfo {
                id: id.clone(),
                description: self.agents[id].description.clone(),
            })
            .collect()
    }

    /// Declared tools for one agent, in registration order.
    #[must_use]
    pub fn tools_for(&self, agent_id: &str) -> Vec<ToolSpec> {
        let Some(order) = self.tool_order.get(agent_id) else {
            return Vec::new();
        };
        let entries = &self.tools[agent_id];
        order.iter().map(|id| entries[id].spec.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAgent;

    impl Capability for NoopAgent {
        fn process<'a>(
            &'a self,
            _state: &'a mut RequestState,
        ) -> BoxFuture<'a, Result<(), EngineError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn noop() -> Arc<dyn Capability> {
        Arc::new(NoopAgent)
    }

    fn spec(id: &str) -> ToolSpec {
        ToolSpec {
            id: id.into(),
            description: format!("{id} tool"),
            requires_network: false,
        }
    }

    #[test]
    fn registration_order_preserved() {
        let mut reg = CapabilityRegistry::new();
        reg.register_agent("recall", "knowledge", noop()).unwrap();
        reg.register_agent("coding", "code", noop()).unwrap();
        reg.register_agent("dashboard", "charts", noop()).unwrap();

        let ids: Vec<_> = reg.agents().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["recall", "coding", "dashboard"]);
    }

    #[test]
    fn duplicate_agent_is_conflict() {
        let mut reg = CapabilityRegistry::new();
        reg.register_agent("recall", "first", noop()).unwrap();
        let result = reg.register_agent("recall", "second", noop());
        assert!(matches!(result, Err(EngineError::Conflict(_))));
        // The original registration survives.
        assert_eq!(reg.agents()[0].description, "first");
    }

    #[test]
    fn resolve_unknown_agent_is_not_found() {
        let reg = CapabilityRegistry::new();
        assert!(matches!(
            reg.resolve_agent("ghost"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn tool_requires_registered_agent() {
        let mut reg = CapabilityRegistry::new();
        let result = reg.register_tool("ghost", spec("search"), noop());
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn duplicate_tool_is_conflict() {
        let mut reg = CapabilityRegistry::new();
        reg.register_agent("recall", "knowledge", noop()).unwrap();
        reg.register_tool("recall", spec("search"), noop()).unwrap();
        let result = reg.register_tool("recall", spec("search"), noop());
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }

    #[test]
    fn tools_scoped_per_agent() {
        let mut reg = CapabilityRegistry::new();
        reg.register_agent("recall", "knowledge", noop()).unwrap();
        reg.register_agent("coding", "code", noop()).unwrap();
        reg.register_tool("recall", spec("search"), noop()).unwrap();

        assert_eq!(reg.tools_for("recall").len(), 1);
        assert!(reg.tools_for("coding").is_empty());
        assert!(reg.resolve_tool("coding", "search").is_err());
        assert!(reg.resolve_tool("recall", "search").is_ok());
    }

    #[test]
    fn tool_order_preserved() {
        let mut reg = CapabilityRegistry::new();
        reg.register_agent("recall", "knowledge", noop()).unwrap();
        reg.register_tool("recall", spec("b"), noop()).unwrap();
        reg.register_tool("recall", spec("a"), noop()).unwrap();

        let ids: Vec<_> = reg.tools_for("recall").into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
