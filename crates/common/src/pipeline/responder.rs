//! Respond stage: final text and citations

use super::{source_label_pattern, Citation, Confidence, Draft, PipelineState, RetrievedPassage, Stage, REPHRASE_TEXT};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

fn round_score(score: f32) -> f32 {
    (score * 1000.0).round() / 1000.0
}

fn citation(passage: &RetrievedPassage) -> Citation {
    let meta = &passage.chunk.metadata;
    Citation {
        document_id: meta.document_id,
        filename: meta.filename.clone(),
        page: meta.page(),
        sheet: meta.sheet().map(str::to_string),
        passage_id: passage.chunk.passage_id(),
        score: round_score(passage.score),
    }
}

/// Source numbers referenced by `[Source N]` labels in the text
fn referenced_sources(text: &str) -> BTreeSet<usize> {
    let Some(pattern) = source_label_pattern() else {
        return BTreeSet::new();
    };
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect()
}

/// Citations for the referenced passages, or for all of them when the text
/// references none that exist
pub(super) fn build_citations(passages: &[RetrievedPassage], text: &str) -> Vec<Citation> {
    let referenced = referenced_sources(text);
    let cited: Vec<Citation> = passages
        .iter()
        .filter(|p| referenced.contains(&p.source_number()))
        .map(citation)
        .collect();

    if cited.is_empty() {
        passages.iter().map(citation).collect()
    } else {
        cited
    }
}

#[instrument(skip_all)]
pub(super) fn respond(mut state: PipelineState) -> Stage {
    if let Some(canned) = &state.canned_response {
        state.final_answer = Some(canned.clone());
        state.citations.clear();
        state.confidence = Confidence::Low;
        return Stage::Done(state);
    }

    let accepted = match (&state.draft, state.is_valid) {
        (Some(Draft::Generated(text)), true) => Some(text.clone()),
        _ => None,
    };

    match accepted {
        Some(text) => {
            state.citations = build_citations(&state.passages, &text);
            state.final_answer = Some(text);
        }
        None => {
            if let Some(reason) = &state.rejection {
                debug!(reason = %reason, "Responding with rephrase request");
            }
            state.final_answer = Some(REPHRASE_TEXT.to_string());
            state.citations.clear();
            state.confidence = Confidence::Low;
        }
    }

    Stage::Done(state)
}
