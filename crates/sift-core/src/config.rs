use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::supervisor::SupervisorConfig;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    /// Load and parse a TOML configuration file. `SIFT_API_KEY` in the
    /// environment overrides the file's `llm.api_key`, keeping secrets out
    /// of checked-in config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&raw)?;
        if let Ok(key) = std::env::var("SIFT_API_KEY")
            && !key.is_empty()
        {
            config.llm.api_key = key;
        }
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `EngineError::Config` on malformed TOML.
    pub fn from_toml(raw: &str) -> Result<Self, EngineError> {
        toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
    }

    #[must_use]
    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            confidence_threshold: self.routing.confidence_threshold,
            default_agent: self.routing.default_agent.clone(),
            offline: self.routing.offline,
        }
    }

    #[must_use]
    pub fn retrieval_config(&self) -> sift_index::RetrievalConfig {
        sift_index::RetrievalConfig {
            collection_prefix: self.retrieval.collection_prefix.clone(),
            k_candidates: self.retrieval.k_candidates,
            k_final: self.retrieval.k_final,
            rerank_enabled: self.retrieval.rerank_enabled,
            embed_timeout: Duration::from_secs(self.timeouts.embed_secs),
            search_timeout: Duration::from_secs(self.timeouts.search_secs),
            rerank_timeout: Duration::from_secs(self.timeouts.rerank_secs),
            synthesis_timeout: Duration::from_secs(self.timeouts.synthesis_secs),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Model for vision-conditioned synthesis and reranking; both stay
    /// disabled without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_agent_id")]
    pub default_agent: String,
    #[serde(default)]
    pub offline: bool,
}

fn default_confidence_threshold() -> f32 {
    0.6
}

fn default_agent_id() -> String {
    "recall".into()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            default_agent: default_agent_id(),
            offline: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default = "default_k_candidates")]
    pub k_candidates: u64,
    #[serde(default = "default_k_final")]
    pub k_final: usize,
    #[serde(default = "default_rerank_enabled")]
    pub rerank_enabled: bool,
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
}

fn default_vector_dim() -> usize {
    768
}

fn default_k_candidates() -> u64 {
    40
}

fn default_k_final() -> usize {
    10
}

fn default_rerank_enabled() -> bool {
    true
}

fn default_collection_prefix() -> String {
    "sift".into()
}

fn default_max_images() -> usize {
    3
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            vector_dim: default_vector_dim(),
            k_candidates: default_k_candidates(),
            k_final: default_k_final(),
            rerank_enabled: default_rerank_enabled(),
            collection_prefix: default_collection_prefix(),
            max_images: default_max_images(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RedactionConfig {
    /// Extra regexes masked as `[REDACTED]`, on top of the built-in
    /// email/phone/id/ip/card patterns.
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_classify_secs")]
    pub classify_secs: u64,
    #[serde(default = "default_select_secs")]
    pub select_secs: u64,
    #[serde(default = "default_embed_secs")]
    pub embed_secs: u64,
    #[serde(default = "default_search_secs")]
    pub search_secs: u64,
    #[serde(default = "default_rerank_secs")]
    pub rerank_secs: u64,
    #[serde(default = "default_synthesis_secs")]
    pub synthesis_secs: u64,
}

fn default_classify_secs() -> u64 {
    20
}

fn default_select_secs() -> u64 {
    20
}

fn default_embed_secs() -> u64 {
    15
}

fn default_search_secs() -> u64 {
    10
}

fn default_rerank_secs() -> u64 {
    30
}

fn default_synthesis_secs() -> u64 {
    60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            classify_secs: default_classify_secs(),
            select_secs: default_select_secs(),
            embed_secs: default_embed_secs(),
            search_secs: default_search_secs(),
            rerank_secs: default_rerank_secs(),
            synthesis_secs: default_synthesis_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    7177
}

fn default_max_body_size() -> usize {
    1_048_576
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            auth_token: None,
            max_body_size: default_max_body_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[llm]
base_url = "http://localhost:11434/v1"
model = "qwen3"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.llm.embedding_model, "nomic-embed-text");
        assert!((config.routing.confidence_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.routing.default_agent, "recall");
        assert_eq!(config.retrieval.k_candidates, 40);
        assert_eq!(config.retrieval.k_final, 10);
        assert!(config.retrieval.rerank_enabled);
        assert_eq!(config.store.qdrant_url, "http://localhost:6334");
        assert_eq!(config.gateway.port, 7177);
    }

    #[test]
    fn overrides_are_honored() {
        let raw = r#"
[llm]
base_url = "https://api.example.com/v1"
model = "gpt-4o-mini"
vision_model = "gpt-4o"

[routing]
confidence_threshold = 0.75
default_agent = "chat"
offline = true

[retrieval]
k_final = 5

[redaction]
patterns = ["secret-\\w+"]

[timeouts]
synthesis_secs = 120
"#;
        let config = Config::from_toml(raw).unwrap();
        assert!((config.routing.confidence_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.routing.default_agent, "chat");
        assert!(config.routing.offline);
        assert_eq!(config.retrieval.k_final, 5);
        assert_eq!(config.llm.vision_model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.redaction.patterns.len(), 1);
        assert_eq!(config.timeouts.synthesis_secs, 120);
    }

    #[test]
    fn missing_llm_section_is_an_error() {
        let result = Config::from_toml("[routing]\noffline = true\n");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml("not toml at all ["),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn retrieval_config_carries_timeouts() {
        let config = Config::from_toml(MINIMAL).unwrap();
        let retrieval = config.retrieval_config();
        assert_eq!(retrieval.embed_timeout, Duration::from_secs(15));
        assert_eq!(retrieval.synthesis_timeout, Duration::from_secs(60));
        assert_eq!(retrieval.collection_prefix, "sift");
    }

    #[test]
    fn supervisor_config_from_routing() {
        let config = Config::from_toml(MINIMAL).unwrap();
        let sup = config.supervisor();
        assert_eq!(sup.default_agent, "recall");
        assert!(!sup.offline);
    }
}
