//! Intent-routed workflow engine: capability registry, LLM-backed intent
//! classification with deterministic fallback, tool selection, and the
//! supervisor state machine.

pub mod classifier;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod registry;
pub mod selector;
pub mod state;
pub mod supervisor;

pub use classifier::IntentClassifier;
pub use config::Config;
pub use error::EngineError;
pub use registry::{AgentInfo, Capability, CapabilityRegistry, ToolSpec};
pub use selector::ToolSelector;
pub use state::{Classification, Request, RequestState, Stage, ToolOutcome, ToolPlan};
pub use supervisor::{QueryService, Response, Supervisor, SupervisorConfig};
