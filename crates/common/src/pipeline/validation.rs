//! Validate stage: admission detection, structural checks and confidence

use super::{source_label_pattern, Confidence, Draft, PipelineState, RetrievedPassage, Stage, ValidationFailure};
use crate::config::PipelineConfig;
use crate::safety::{detect_prompt_injection, SafetyFlag};
use tracing::{debug, info, instrument, warn};

/// Phrases by which a model declares the context insufficient
pub const ADMISSION_PHRASES: &[&str] = &[
    "do not contain",
    "don't contain",
    "does not contain",
    "no information",
    "not enough information",
    "cannot find",
    "can't find",
    "cannot answer",
    "not found in",
    "not mentioned",
];

/// Scores within this distance of a threshold count as reaching it
const THRESHOLD_TOLERANCE: f32 = 1e-4;

/// Whether the draft admits the documents lack the answer
pub fn is_admission(draft: &str) -> bool {
    let lower = draft.to_lowercase();
    ADMISSION_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn is_hedged(draft: &str, hedging_phrases: &[String]) -> bool {
    let lower = draft.to_lowercase();
    hedging_phrases
        .iter()
        .any(|phrase| !phrase.is_empty() && lower.contains(&phrase.to_lowercase()))
}

/// Confidence from mean retrieval similarity and hedging in the draft
pub fn assess_confidence(passages: &[RetrievedPassage], draft: &str, config: &PipelineConfig) -> Confidence {
    let mean = if passages.is_empty() {
        0.0
    } else {
        passages.iter().map(|p| p.score).sum::<f32>() / passages.len() as f32
    };
    let hedged = is_hedged(draft, &config.hedging_phrases);

    if mean + THRESHOLD_TOLERANCE >= config.high_confidence_threshold && !hedged {
        Confidence::High
    } else if mean + THRESHOLD_TOLERANCE >= config.medium_confidence_threshold || hedged {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn structural_check(draft: &Draft, config: &PipelineConfig) -> Option<ValidationFailure> {
    let text = match draft {
        Draft::GatewayError(message) => return Some(ValidationFailure::GatewayError(message.clone())),
        Draft::Generated(text) => text.trim(),
    };

    let chars = text.chars().count();
    if chars < config.min_answer_chars {
        return Some(ValidationFailure::TooShort {
            chars,
            min: config.min_answer_chars,
        });
    }

    let cited = source_label_pattern().is_some_and(|re| re.is_match(text));
    if !cited {
        return Some(ValidationFailure::MissingCitation);
    }

    None
}

#[instrument(skip_all)]
pub(super) fn validate(mut state: PipelineState, config: &PipelineConfig) -> Stage {
    if !state.needs_retrieval {
        return Stage::Respond(state);
    }

    if state
        .passages
        .iter()
        .any(|p| detect_prompt_injection(&p.chunk.text).is_injection())
    {
        warn!("Retrieved passage contains an injection pattern");
        state.flag(SafetyFlag::InjectionInContext);
    }

    let Some(draft) = state.draft.clone() else {
        state.is_valid = false;
        state.rejection = Some(ValidationFailure::NoDraft);
        return Stage::Respond(state);
    };

    if let Draft::Generated(text) = &draft {
        if is_admission(text) {
            info!("Draft admits the documents lack the answer");
            state.is_valid = true;
            state.admitted = true;
            state.confidence = Confidence::Low;
            return Stage::Respond(state);
        }
    }

    if let Some(failure) = structural_check(&draft, config) {
        info!(reason = %failure, "Draft rejected");
        state.is_valid = false;
        state.confidence = Confidence::Low;
        state.rejection = Some(failure);
        return Stage::Respond(state);
    }

    if let Draft::Generated(text) = &draft {
        state.confidence = assess_confidence(&state.passages, text, config);
    }
    state.is_valid = true;
    debug!(confidence = %state.confidence, "Draft accepted");

    Stage::Respond(state)
}
