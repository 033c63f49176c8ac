use std::fmt::Write as _;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use sift_llm::provider::parse_structured;
use sift_llm::{LlmError, LlmProvider, Message, MessagePart, Role};

use crate::error::IndexError;
use crate::types::Evidence;

/// Returned verbatim when retrieval produced nothing; the model is never
/// asked to answer from an empty evidence set.
pub const NO_EVIDENCE_ANSWER: &str =
    "No evidence found in your index for this question.";

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub answer: String,
    /// Identifiers of the evidence items the answer relied on.
    pub cited: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SynthOutput {
    answer: String,
    /// doc_ids of the evidence actually used.
    cited: Vec<String>,
}

/// Produces the final grounded answer from retrieved evidence, conditioning
/// on image content when visual evidence survived reranking.
pub struct Synthesizer<P> {
    provider: Arc<P>,
    vision_provider: Option<Arc<P>>,
    max_images: usize,
}

impl<P> std::fmt::Debug for Synthesizer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("vision", &self.vision_provider.is_some())
            .field("max_images", &self.max_images)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> Synthesizer<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            vision_provider: None,
            max_images: 3,
        }
    }

    /// Enable the vision branch, answering through this provider when image
    /// evidence is present.
    #[must_use]
    pub fn with_vision(mut self, provider: Arc<P>) -> Self {
        self.vision_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }

    /// Compose a grounded answer from the (already redacted) evidence.
    ///
    /// Empty evidence yields [`NO_EVIDENCE_ANSWER`] without a model call.
    /// An unparsable model response degrades to citing every supplied item;
    /// only an unreachable backend is an error.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Synthesis` when the generation backend fails.
    pub async fn synthesize(
        &self,
        question: &str,
        evidence: &[Evidence],
    ) -> Result<Synthesis, IndexError> {
        if evidence.is_empty() {
            return Ok(Synthesis {
                answer: NO_EVIDENCE_ANSWER.into(),
                cited: Vec::new(),
            });
        }

        let (messages, provider) = self.build_request(question, evidence);
        let raw = match provider.chat(&messages).await {
            Ok(raw) => raw,
            Err(e) => return Err(synthesis_error(&e)),
        };

        Ok(match parse_structured::<SynthOutput>(&raw) {
            Ok(out) => {
                let known: Vec<String> = out
                    .cited
                    .into_iter()
                    .filter(|id| evidence.iter().any(|e| &e.doc_id == id))
                    .collect();
                Synthesis {
                    answer: out.answer,
                    cited: known,
                }
            }
            // The model answered but ignored the output shape; keep the text
            // and cite everything it saw.
            Err(_) => Synthesis {
                answer: raw,
                cited: evidence.iter().map(|e| e.doc_id.clone()).collect(),
            },
        })
    }

    fn build_request(&self, question: &str, evidence: &[Evidence]) -> (Vec<Message>, &Arc<P>) {
        let system = format!(
            "You answer questions from a personal knowledge index. Use only \
             the numbered evidence below; say plainly when it is insufficient. \
             Respond with JSON only: {}",
            sift_llm::provider::schema_text::<SynthOutput>(),
        );

        let mut context = String::new();
        for (i, e) in evidence.iter().enumerate() {
            let _ = write!(context, "[{}] (source: {}, doc: {})", i + 1, e.modality, e.doc_id);
            if let Some(ref path) = e.provenance.path {
                let _ = write!(context, " file: {path}");
            }
            if let Some(ref url) = e.provenance.url {
                let _ = write!(context, " url: {url}");
            }
            let _ = writeln!(context, "\n{}", e.snippet);
        }

        let user_text = format!("Evidence:\n{context}\nQuestion: {question}");

        let images: Vec<MessagePart> = match self.vision_provider {
            Some(_) => evidence
                .iter()
                .filter_map(|e| e.image_data.as_ref())
                .take(self.max_images)
                .map(|data| MessagePart::Image {
                    data: data.clone(),
                    mime_type: "image/jpeg".into(),
                })
                .collect(),
            None => Vec::new(),
        };

        let provider = match (&self.vision_provider, images.is_empty()) {
            (Some(vision), false) => vision,
            _ => &self.provider,
        };

        let messages = vec![
            Message::text(Role::System, system),
            Message::with_parts(Role::User, user_text, images),
        ];
        (messages, provider)
    }
}

fn synthesis_error(e: &LlmError) -> IndexError {
    IndexError::Synthesis(e.to_string())
}
