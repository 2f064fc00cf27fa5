//! Retrieve stage: embed the question and fetch the nearest passages

use super::{PipelineState, RetrievedPassage, Stage};
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::index::{IndexHit, RetrievalIndex};
use crate::metrics;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Similarity from cosine distance, clamped to [0, 1]
fn similarity(distance: f32) -> f32 {
    let score = 1.0 - distance;
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Convert index hits into ranked passages, most similar first
pub(super) fn rank_hits(hits: Vec<IndexHit>) -> Vec<RetrievedPassage> {
    let mut scored: Vec<(f32, IndexHit)> = hits
        .into_iter()
        .map(|hit| (similarity(hit.distance), hit))
        .collect();

    // sort_by is stable, so equal scores keep index order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .enumerate()
        .map(|(rank, (score, hit))| RetrievedPassage {
            chunk: hit.chunk,
            score,
            rank,
        })
        .collect()
}

async fn search(
    question: &str,
    top_k: usize,
    embedder: &dyn Embedder,
    index: &dyn RetrievalIndex,
) -> Result<Vec<IndexHit>> {
    let vector = embedder.embed(question).await?;
    index.search(&vector, top_k).await
}

/// Fetch passages for the question. Gateway failures degrade to an empty list.
#[instrument(skip_all, fields(top_k = state.top_k))]
pub(super) async fn retrieve(
    mut state: PipelineState,
    embedder: &dyn Embedder,
    index: &dyn RetrievalIndex,
) -> Stage {
    let start = Instant::now();
    let passages = match search(&state.question, state.top_k, embedder, index).await {
        Ok(hits) => {
            metrics::record_search(start.elapsed().as_secs_f64(), hits.len(), true);
            rank_hits(hits)
        }
        Err(e) => {
            metrics::record_search(start.elapsed().as_secs_f64(), 0, false);
            warn!(error = %e, "Retrieval failed, continuing without passages");
            Vec::new()
        }
    };

    debug!(
        passages = passages.len(),
        best_score = passages.first().map(|p| p.score),
        "Retrieval complete"
    );

    if !state.record_passages(passages) {
        return Stage::Respond(state);
    }
    Stage::Reason(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::pipeline::testing::{chunk, FailingEmbedder, FixedIndex};
    use crate::pipeline::AnswerStyle;

    fn hit(text: &str, distance: f32) -> IndexHit {
        IndexHit {
            chunk: chunk(text, 0),
            distance,
        }
    }

    #[test]
    fn test_similarity_is_clamped() {
        assert_eq!(similarity(0.25), 0.75);
        assert_eq!(similarity(1.5), 0.0);
        assert_eq!(similarity(-0.5), 1.0);
        assert_eq!(similarity(f32::NAN), 0.0);
    }

    #[test]
    fn test_rank_hits_orders_by_score() {
        let ranked = rank_hits(vec![hit("b", 0.4), hit("a", 0.1), hit("c", 0.4)]);
        let texts: Vec<&str> = ranked.iter().map(|p| p.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(ranked.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(ranked[2].source_number(), 3);
    }

    #[tokio::test]
    async fn test_retrieve_attaches_passages() {
        let index = FixedIndex::with_distances(&[0.3, 0.1, 0.2]);
        let state = PipelineState::new("What happened in the report?", 2, AnswerStyle::Concise);

        match retrieve(state, &HashingEmbedder::new(16), &index).await {
            Stage::Reason(state) => {
                assert_eq!(state.passages.len(), 2);
                assert!(state.passages[0].score >= state.passages[1].score);
            }
            _ => panic!("expected Reason"),
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_yields_no_passages() {
        let index = FixedIndex::with_distances(&[0.1]);
        let state = PipelineState::new("What happened in the report?", 5, AnswerStyle::Concise);

        match retrieve(state, &FailingEmbedder, &index).await {
            Stage::Reason(state) => assert!(state.passages.is_empty()),
            _ => panic!("expected Reason"),
        }
        assert_eq!(index.searches(), 0);
    }
}
