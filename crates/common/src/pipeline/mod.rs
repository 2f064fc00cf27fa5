//! Reasoning Pipeline - Answers questions from indexed documents
//!
//! Five gated stages run strictly in sequence:
//! - Plan: guardrails and early exits
//! - Retrieve: embed the question and search the index
//! - Reason: build the grounded prompt and call the model
//! - Validate: admission detection, structural checks, confidence
//! - Respond: final text and citations
//!
//! Every branch ends in a well-formed [`Answer`]; collaborator failures
//! degrade to low-confidence answers instead of errors.

mod planner;
mod reasoner;
mod responder;
mod retriever;
mod state;
mod validation;

pub use state::{Draft, PipelineState, RetrievedPassage, ValidationFailure};
pub use validation::{assess_confidence, is_admission, ADMISSION_PHRASES};

use crate::config::{PipelineConfig, TOP_K_LIMIT};
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::index::RetrievalIndex;
use crate::llm::LanguageModel;
use crate::metrics::PipelineTimer;
pub use crate::safety::SafetyFlag;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;
use validator::Validate;

/// Refusal for questions matching an injection pattern
pub const REFUSAL_TEXT: &str =
    "I cannot process this question as it contains potentially unsafe patterns.";

/// Guidance when nothing has been indexed yet
pub const EMPTY_INDEX_TEXT: &str =
    "No documents have been uploaded yet. Please upload documents before asking questions.";

/// Request for detail when the question is too short
pub const VAGUE_QUESTION_TEXT: &str =
    "Your question seems too short. Could you provide more details?";

/// Fixed phrasing the model is told to use when the context lacks the answer
pub const ADMISSION_TEXT: &str = "The provided documents do not contain information about this.";

/// Fallback shown when Validate rejects a draft
pub const REPHRASE_TEXT: &str =
    "I couldn't generate a proper answer. Could you rephrase your question?";

/// Matches `[Source N]` labels, capturing N
pub(crate) fn source_label_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\[source\s*(\d+)\]").ok())
        .as_ref()
}

/// Answer confidence level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer style requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    /// Brief, to-the-point
    #[default]
    Concise,
    /// Comprehensive explanation
    Detailed,
    /// Bullet points
    #[serde(alias = "bulleted", alias = "bullets")]
    Bullet,
}

impl AnswerStyle {
    pub fn instruction(&self) -> &'static str {
        match self {
            AnswerStyle::Concise => "Provide a brief, direct answer.",
            AnswerStyle::Detailed => "Provide a comprehensive, detailed answer.",
            AnswerStyle::Bullet => "Provide the answer as bullet points.",
        }
    }
}

impl FromStr for AnswerStyle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "concise" => Ok(AnswerStyle::Concise),
            "detailed" => Ok(AnswerStyle::Detailed),
            "bullet" | "bulleted" | "bullets" => Ok(AnswerStyle::Bullet),
            other => Err(AppError::Validation {
                message: format!("unknown answer style '{}'", other),
                field: Some("answer_style".to_string()),
            }),
        }
    }
}

/// Citation for one retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: Uuid,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub passage_id: String,
    /// Similarity rounded to three decimals
    pub score: f32,
}

/// Final answer object returned for every question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: Confidence,
    pub safety_flags: Vec<SafetyFlag>,
    pub trace_id: Uuid,
}

impl Answer {
    fn from_state(state: PipelineState, trace_id: Uuid) -> Self {
        Self {
            answer: state.final_answer.unwrap_or_else(|| REPHRASE_TEXT.to_string()),
            citations: state.citations,
            confidence: state.confidence,
            safety_flags: state.safety_flags,
            trace_id,
        }
    }
}

fn default_request_top_k() -> usize {
    5
}

/// Question as received from an outer layer
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 1000))]
    pub question: String,

    #[serde(default = "default_request_top_k")]
    #[validate(range(min = 1, max = 20))]
    pub top_k: usize,

    #[serde(default)]
    pub answer_style: AnswerStyle,
}

/// Stage tag carrying the state to the next step
enum Stage {
    Plan(PipelineState),
    Retrieve(PipelineState),
    Reason(PipelineState),
    Validate(PipelineState),
    Respond(PipelineState),
    Done(PipelineState),
}

/// The five-stage question answering pipeline.
///
/// Holds only shared collaborators and immutable policy, so one instance
/// can serve concurrent questions.
pub struct Pipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn RetrievalIndex>,
    llm: Arc<dyn LanguageModel>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn RetrievalIndex>,
        llm: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            config,
        }
    }

    /// Validate an outer-layer request, then answer it
    pub async fn handle(&self, request: AskRequest) -> Result<Answer> {
        request.validate()?;
        if request.question.chars().count() > self.config.max_question_chars {
            return Err(AppError::Validation {
                message: format!(
                    "question exceeds maximum length of {} characters",
                    self.config.max_question_chars
                ),
                field: Some("question".to_string()),
            });
        }
        Ok(self.ask(&request.question, request.top_k, request.answer_style).await)
    }

    /// Answer a question. Never fails: every path yields a well-formed answer.
    pub async fn ask(&self, question: &str, top_k: usize, style: AnswerStyle) -> Answer {
        let trace_id = Uuid::new_v4();
        let top_k = top_k.clamp(1, self.config.max_top_k.clamp(1, TOP_K_LIMIT));
        let span = info_span!("ask", %trace_id, top_k, style = ?style);

        async move {
            let timer = PipelineTimer::start();
            let state = self.run(PipelineState::new(question, top_k, style)).await;

            info!(
                outcome = state.outcome(),
                confidence = %state.confidence,
                passages = state.passages.len(),
                citations = state.citations.len(),
                flags = ?state.safety_flags,
                "Question answered"
            );
            timer.finish(state.outcome(), state.confidence.as_str());

            Answer::from_state(state, trace_id)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, state: PipelineState) -> PipelineState {
        let mut stage = Stage::Plan(state);
        loop {
            stage = match stage {
                Stage::Plan(state) => {
                    let has_chunks = self.index_has_chunks().await;
                    planner::plan(state, has_chunks, &self.config)
                }
                Stage::Retrieve(state) => {
                    retriever::retrieve(state, self.embedder.as_ref(), self.index.as_ref()).await
                }
                Stage::Reason(state) => reasoner::reason(state, self.llm.as_ref(), &self.config).await,
                Stage::Validate(state) => validation::validate(state, &self.config),
                Stage::Respond(state) => responder::respond(state),
                Stage::Done(state) => return state,
            };
        }
    }

    /// Whether the index holds any chunk; an unreadable index is treated as populated
    async fn index_has_chunks(&self) -> bool {
        match self.index.count().await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(error = %e, "Index count failed, proceeding to retrieval");
                true
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators shared by the stage tests

    use super::*;
    use crate::index::IndexHit;
    use crate::models::{Chunk, ChunkMetadata, DocumentSummary, IndexedChunk};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn chunk(text: &str, index: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            token_count: text.split_whitespace().count(),
            sequence_index: index,
            metadata: ChunkMetadata::new(Uuid::nil(), "report.txt"),
        }
    }

    pub fn passages(scores: &[f32]) -> Vec<RetrievedPassage> {
        scores
            .iter()
            .enumerate()
            .map(|(rank, &score)| RetrievedPassage {
                chunk: chunk(&format!("Passage number {} about revenue.", rank), rank),
                score,
                rank,
            })
            .collect()
    }

    /// Returns the scripted text, or an error when none is set
    pub struct ScriptedModel {
        pub reply: Option<String>,
        pub calls: AtomicUsize,
        pub last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedModel {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str, _temperature: f32, _max_tokens: usize) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            self.reply.clone().ok_or_else(|| AppError::LanguageModel {
                message: "quota exceeded".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Embedder whose every call fails
    pub struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingError {
                message: "network unreachable".to_string(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AppError::EmbeddingError {
                message: "network unreachable".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            0
        }
    }

    /// Index returning fixed hits regardless of the query
    pub struct FixedIndex {
        pub hits: Vec<IndexHit>,
        pub searches: AtomicUsize,
    }

    impl FixedIndex {
        pub fn with_distances(distances: &[f32]) -> Self {
            Self {
                hits: distances
                    .iter()
                    .enumerate()
                    .map(|(i, &distance)| IndexHit {
                        chunk: chunk(&format!("Fact {} from the quarterly report.", i), i),
                        distance,
                    })
                    .collect(),
                searches: AtomicUsize::new(0),
            }
        }

        pub fn searches(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RetrievalIndex for FixedIndex {
        async fn add(&self, _chunks: Vec<IndexedChunk>) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }

        async fn exists_by_hash(&self, _hash: &str) -> Result<Option<Uuid>> {
            Ok(None)
        }

        async fn delete(&self, _document_id: Uuid) -> Result<usize> {
            Ok(0)
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.hits.len())
        }

        async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<usize> {
            Ok(0)
        }
    }
}
