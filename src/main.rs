use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use sift_core::knowledge::{RecallAgent, RecallSearchTool};
use sift_core::{
    Capability, CapabilityRegistry, Config, IntentClassifier, QueryService, Supervisor,
    ToolSelector, ToolSpec,
};
use sift_gateway::GatewayServer;
use sift_index::ingest::Ingestor;
use sift_index::qdrant_store::QdrantStore;
use sift_index::rerank::VlmReranker;
use sift_index::synthesize::Synthesizer;
use sift_index::vector_store::VectorStore;
use sift_index::{Redactor, RetrievalPipeline};
use sift_llm::openai::OpenAiProvider;

#[derive(Debug, Parser)]
#[command(name = "sift", version, about = "Intent-routed assistant over a personal multimodal index")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "sift.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sift=info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let provider = Arc::new(OpenAiProvider::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
        Some(config.llm.embedding_model.clone()),
    ));
    let vision_provider = config
        .llm
        .vision_model
        .as_ref()
        .map(|model| Arc::new(provider.as_ref().clone().with_model(model)));

    let store: Arc<dyn VectorStore> = Arc::new(
        QdrantStore::new(&config.store.qdrant_url)
            .with_context(|| format!("connecting to qdrant at {}", config.store.qdrant_url))?,
    );

    // Startup barrier: collections and the registry must be in place before
    // the gateway accepts its first request.
    let ingestor = Arc::new(Ingestor::new(
        Arc::clone(&store),
        config.retrieval.collection_prefix.clone(),
        config.retrieval.vector_dim,
    ));
    ingestor
        .ensure_collections()
        .await
        .context("creating vector collections")?;

    let redactor =
        Redactor::with_patterns(&config.redaction.patterns).context("compiling redaction patterns")?;

    let mut synthesizer =
        Synthesizer::new(Arc::clone(&provider)).with_max_images(config.retrieval.max_images);
    if let Some(ref vision) = vision_provider {
        synthesizer = synthesizer.with_vision(Arc::clone(vision));
    }

    let mut pipeline = RetrievalPipeline::new(
        Arc::clone(&provider),
        Arc::clone(&store),
        synthesizer,
        config.retrieval_config(),
    )
    .with_redactor(redactor.clone());
    if let Some(ref vision) = vision_provider {
        pipeline = pipeline.with_reranker(VlmReranker::new(Arc::clone(vision)));
    }
    let pipeline = Arc::new(pipeline);

    let mut registry = CapabilityRegistry::new();
    registry.register_agent(
        "recall",
        "answers questions from your personal files, browsing history, screenshots and images",
        Arc::new(RecallAgent::new(Arc::clone(&pipeline))) as Arc<dyn Capability>,
    )?;
    registry.register_tool(
        "recall",
        ToolSpec {
            id: "recall_search".into(),
            description: "look up evidence in the personal index without answering".into(),
            requires_network: false,
        },
        Arc::new(RecallSearchTool::new(Arc::clone(&pipeline))) as Arc<dyn Capability>,
    )?;
    let registry = Arc::new(registry);

    let classify_timeout = std::time::Duration::from_secs(config.timeouts.classify_secs);
    let select_timeout = std::time::Duration::from_secs(config.timeouts.select_secs);
    let supervisor = Supervisor::new(
        Arc::clone(&registry),
        IntentClassifier::new(Arc::clone(&provider), classify_timeout),
        ToolSelector::new(Arc::clone(&provider), select_timeout),
        config.supervisor(),
    )?
    .with_redactor(redactor);
    let engine: Arc<dyn QueryService> = Arc::new(supervisor);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(
        agents = registry.agents().len(),
        "sift ready, serving on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    GatewayServer::new(
        &config.gateway.bind,
        config.gateway.port,
        engine,
        ingestor,
        shutdown_rx,
    )
    .with_auth(config.gateway.auth_token.clone())
    .with_max_body_size(config.gateway.max_body_size)
    .serve()
    .await?;

    Ok(())
}
