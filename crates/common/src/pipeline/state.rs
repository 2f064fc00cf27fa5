//! Per-question state threaded through the pipeline stages

use super::{AnswerStyle, Citation, Confidence};
use crate::models::Chunk;
use crate::safety::SafetyFlag;
use std::fmt;

/// A chunk returned for one query, with its similarity
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub chunk: Chunk,

    /// Cosine similarity in [0, 1]
    pub score: f32,

    /// Position in the result list, 0 = most relevant
    pub rank: usize,
}

impl RetrievedPassage {
    /// Label used in the prompt and in `[Source N]` citations
    pub fn source_number(&self) -> usize {
        self.rank + 1
    }
}

/// Output of the Reason stage
#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    /// Text produced by the model (or the fixed admission when nothing was retrieved)
    Generated(String),
    /// The model call failed; carries the gateway's message
    GatewayError(String),
}

impl Draft {
    pub fn is_error(&self) -> bool {
        matches!(self, Draft::GatewayError(_))
    }
}

/// Why Validate rejected a draft. Logged, never shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    TooShort { chars: usize, min: usize },
    GatewayError(String),
    MissingCitation,
    NoDraft,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::TooShort { chars, min } => {
                write!(f, "answer too short ({} < {} chars)", chars, min)
            }
            ValidationFailure::GatewayError(message) => write!(f, "language model error: {}", message),
            ValidationFailure::MissingCitation => f.write_str("answer cites no source label"),
            ValidationFailure::NoDraft => f.write_str("no draft was produced"),
        }
    }
}

/// Accumulating record for one question
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub question: String,
    pub top_k: usize,
    pub style: AnswerStyle,

    pub needs_retrieval: bool,
    pub passages: Vec<RetrievedPassage>,
    pub draft: Option<Draft>,

    /// Insertion-ordered, duplicate-free
    pub safety_flags: Vec<SafetyFlag>,
    pub confidence: Confidence,
    pub is_valid: bool,
    pub admitted: bool,

    /// Text emitted verbatim when Plan short-circuits
    pub canned_response: Option<String>,
    pub rejection: Option<ValidationFailure>,

    pub final_answer: Option<String>,
    pub citations: Vec<Citation>,
}

impl PipelineState {
    pub fn new(question: impl Into<String>, top_k: usize, style: AnswerStyle) -> Self {
        Self {
            question: question.into(),
            top_k,
            style,
            needs_retrieval: true,
            passages: Vec::new(),
            draft: None,
            safety_flags: Vec::new(),
            confidence: Confidence::Low,
            is_valid: false,
            admitted: false,
            canned_response: None,
            rejection: None,
            final_answer: None,
            citations: Vec::new(),
        }
    }

    /// Record a safety flag once
    pub fn flag(&mut self, flag: SafetyFlag) {
        if !self.safety_flags.contains(&flag) {
            self.safety_flags.push(flag);
        }
    }

    /// End the question early with a canned response; nothing is retrieved afterwards
    pub fn short_circuit(&mut self, response: &str, flag: SafetyFlag) {
        self.needs_retrieval = false;
        self.canned_response = Some(response.to_string());
        self.flag(flag);
    }

    /// Attach retrieval results. Refused once retrieval has been ruled out.
    pub fn record_passages(&mut self, passages: Vec<RetrievedPassage>) -> bool {
        if !self.needs_retrieval {
            return false;
        }
        self.passages = passages;
        true
    }

    /// Coarse outcome label for metrics
    pub fn outcome(&self) -> &'static str {
        if self.canned_response.is_some() {
            "short_circuit"
        } else if !self.is_valid {
            "rejected"
        } else if self.admitted {
            "admission"
        } else {
            "answered"
        }
    }
}
