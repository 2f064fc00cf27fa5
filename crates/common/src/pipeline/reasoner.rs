//! Reason stage: grounded prompt construction and generation

use super::{AnswerStyle, Draft, PipelineState, RetrievedPassage, Stage, ADMISSION_TEXT};
use crate::config::PipelineConfig;
use crate::llm::LanguageModel;
use tracing::{debug, instrument, warn};

/// Labelled context block, one `[Source N]` entry per passage
pub(super) fn build_context(passages: &[RetrievedPassage], chars_per_passage: usize) -> String {
    passages
        .iter()
        .map(|p| {
            let text: String = p.chunk.text.chars().take(chars_per_passage).collect();
            format!("[Source {}] {}", p.source_number(), text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(super) fn build_prompt(question: &str, context: &str, style: AnswerStyle) -> String {
    format!(
        "You are a helpful assistant answering questions based only on the provided document context.\n\n\
         Question: {question}\n\n\
         Context from documents:\n\
         {context}\n\n\
         Instructions:\n\
         - Answer ONLY based on the provided context\n\
         - {style}\n\
         - If the context doesn't contain the answer, say \"{admission}\"\n\
         - Cite which source(s) support each claim using [Source N] notation\n\n\
         Answer:",
        question = question,
        context = context,
        style = style.instruction(),
        admission = ADMISSION_TEXT,
    )
}

/// Produce a draft answer. Without passages the draft is the fixed admission
/// and the model is not called.
#[instrument(skip_all, fields(passages = state.passages.len(), model = llm.model_name()))]
pub(super) async fn reason(mut state: PipelineState, llm: &dyn LanguageModel, config: &PipelineConfig) -> Stage {
    if !state.needs_retrieval {
        return Stage::Respond(state);
    }

    if state.passages.is_empty() {
        debug!("No passages retrieved, drafting admission");
        state.draft = Some(Draft::Generated(ADMISSION_TEXT.to_string()));
        return Stage::Validate(state);
    }

    let context = build_context(&state.passages, config.context_chars_per_passage);
    let prompt = build_prompt(&state.question, &context, state.style);

    let draft = match llm.generate(&prompt, config.temperature, config.max_tokens).await {
        Ok(text) => {
            debug!(chars = text.len(), "Draft generated");
            Draft::Generated(text)
        }
        Err(e) => {
            warn!(error = %e, "Language model call failed");
            Draft::GatewayError(e.to_string())
        }
    };

    state.draft = Some(draft);
    Stage::Validate(state)
}
