//! Multimodal retrieval over per-modality vector collections: ingestion,
//! fused search, conditional reranking, redaction, and answer synthesis.

pub mod error;
pub mod fusion;
pub mod in_memory_store;
pub mod ingest;
pub mod pipeline;
pub mod qdrant_store;
pub mod redact;
pub mod rerank;
pub mod synthesize;
pub mod types;
pub mod vector_store;

pub use error::IndexError;
pub use pipeline::{Answered, RetrievalConfig, RetrievalPipeline};
pub use redact::Redactor;
pub use types::{Evidence, Modality, Provenance, QueryFilters, TimeRange};
