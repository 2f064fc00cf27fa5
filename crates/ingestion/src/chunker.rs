//! Text chunking module
//!
//! Splits document text into overlapping, token-bounded chunks that follow
//! paragraph boundaries where they can and sentence boundaries where they must.

use docqa_common::config::ChunkingConfig;
use docqa_common::models::{Chunk, ChunkMetadata};
use docqa_common::tokens::{create_token_counter, TokenCounter};
use regex_lite::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const PARAGRAPH_BREAK: &str = "\n\n";
const SENTENCE_BREAK: &str = " ";
const HARD_SPLIT_BYTES_PER_TOKEN: usize = 8;

fn paragraph_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n\s*\n").ok()).as_ref()
}

/// A piece of source text plus the separator placed before it when appended
#[derive(Debug, Clone, Copy)]
struct Unit<'a> {
    text: &'a str,
    sep: &'static str,
}

/// Non-empty, trimmed paragraphs
fn split_paragraphs(text: &str) -> Vec<&str> {
    let pieces: Vec<&str> = match paragraph_pattern() {
        Some(pattern) => pattern.split(text).collect(),
        None => text.split("\n\n").collect(),
    };
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(end, next)) = chars.peek() {
            if next.is_whitespace() {
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Byte spans of whitespace-separated words
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn join(buffer: &str, sep: &str, text: &str) -> String {
    if buffer.is_empty() {
        text.to_string()
    } else {
        let mut joined = String::with_capacity(buffer.len() + sep.len() + text.len());
        joined.push_str(buffer);
        joined.push_str(sep);
        joined.push_str(text);
        joined
    }
}

/// Token-aware document segmenter
pub struct Segmenter {
    counter: Arc<dyn TokenCounter>,
    config: ChunkingConfig,
}

impl Segmenter {
    pub fn new(counter: Arc<dyn TokenCounter>, config: ChunkingConfig) -> Self {
        Self { counter, config }
    }

    /// Build a segmenter with the counter named in the configuration
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(create_token_counter(config.token_counter), config.clone())
    }

    fn count(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Split `text` into chunks carrying `metadata`.
    ///
    /// Every chunk but the last holds between `min_chunk_tokens` and
    /// `max_chunk_tokens`, and each chunk after the first opens with the
    /// trailing `overlap_tokens` of its predecessor.
    pub fn segment(&self, text: &str, metadata: &ChunkMetadata) -> Vec<Chunk> {
        let texts = self.pack(self.units(text));

        debug!(
            input_chars = text.len(),
            chunk_count = texts.len(),
            counter = self.counter.name(),
            target_tokens = self.config.target_tokens,
            "Text chunked"
        );

        texts
            .into_iter()
            .enumerate()
            .map(|(sequence_index, text)| Chunk {
                token_count: self.count(&text),
                text,
                sequence_index,
                metadata: metadata.clone(),
            })
            .collect()
    }

    /// Paragraphs, with oversized ones broken into sentences or word runs
    fn units<'a>(&self, text: &'a str) -> Vec<Unit<'a>> {
        let limit = self.config.max_unit_tokens();
        let mut units = Vec::new();

        for paragraph in split_paragraphs(text) {
            if self.count(paragraph) <= limit {
                units.push(Unit {
                    text: paragraph,
                    sep: PARAGRAPH_BREAK,
                });
                continue;
            }

            let mut pieces = Vec::new();
            for sentence in split_sentences(paragraph) {
                if self.count(sentence) <= limit {
                    pieces.push(sentence);
                } else {
                    warn!(
                        tokens = self.count(sentence),
                        limit,
                        "Sentence exceeds chunk size, splitting on word boundaries"
                    );
                    pieces.extend(self.hard_split(sentence, limit));
                }
            }

            for (i, piece) in pieces.into_iter().enumerate() {
                units.push(Unit {
                    text: piece,
                    sep: if i == 0 { PARAGRAPH_BREAK } else { SENTENCE_BREAK },
                });
            }
        }

        units
    }

    /// Greedy word runs of at most `limit` tokens
    fn hard_split<'a>(&self, text: &'a str, limit: usize) -> Vec<&'a str> {
        let spans = word_spans(text);
        let mut pieces = Vec::new();
        let mut i = 0;

        while i < spans.len() {
            let take = self.words_within(text, &spans[i..], limit).max(1);
            pieces.push(&text[spans[i].0..spans[i + take - 1].1]);
            i += take;
        }
        pieces
    }

    /// Number of leading spans of `rest` whose run fits in `limit` tokens.
    /// Searches a window of about `8 * limit` bytes, doubling it only while
    /// every word inside still fits.
    fn words_within(&self, text: &str, rest: &[(usize, usize)], limit: usize) -> usize {
        let start = rest[0].0;
        let mut window = limit.saturating_mul(HARD_SPLIT_BYTES_PER_TOKEN).max(1);

        loop {
            let bound = start.saturating_add(window);
            let inside = rest.partition_point(|&(_, end)| end <= bound).max(1);
            let candidates = &rest[..inside];
            let fit = candidates.partition_point(|&(_, end)| self.count(&text[start..end]) <= limit);
            if fit < candidates.len() || inside == rest.len() {
                return fit;
            }
            window = window.saturating_mul(2);
        }
    }

    /// Largest word prefix of `unit` that keeps `buffer + sep + prefix` within `limit`
    fn split_to_fit<'a>(&self, buffer: &str, unit: Unit<'a>, limit: usize) -> Option<(&'a str, &'a str)> {
        let spans = word_spans(unit.text);
        let fit = spans.partition_point(|&(_, end)| self.count(&join(buffer, unit.sep, &unit.text[..end])) <= limit);
        if fit == 0 || fit == spans.len() {
            return None;
        }
        Some((&unit.text[..spans[fit - 1].1], &unit.text[spans[fit].0..]))
    }

    /// Shortest word-aligned suffix holding at least `overlap_tokens`
    fn overlap_seed(&self, chunk: &str) -> String {
        let overlap = self.config.overlap_tokens;
        if overlap == 0 {
            return String::new();
        }

        let starts: Vec<usize> = word_spans(chunk).into_iter().map(|(s, _)| s).collect();
        let reach = starts.partition_point(|&s| self.count(&chunk[s..]) >= overlap);
        match reach {
            0 => chunk.to_string(),
            n => chunk[starts[n - 1]..].to_string(),
        }
    }

    fn pack(&self, units: Vec<Unit<'_>>) -> Vec<String> {
        let target = self.config.target_tokens;
        let min = self.config.min_chunk_tokens;
        let max = self.config.max_chunk_tokens;

        let mut chunks = Vec::new();
        let mut pending: VecDeque<Unit<'_>> = units.into();
        let mut buffer = String::new();
        // Whether the buffer holds anything beyond the overlap seed
        let mut fresh = false;

        while let Some(unit) = pending.pop_front() {
            if buffer.is_empty() {
                buffer.push_str(unit.text);
                fresh = true;
                continue;
            }

            let candidate = join(&buffer, unit.sep, unit.text);
            let tokens = self.count(&candidate);
            let undersized = !fresh || self.count(&buffer) < min;

            if tokens <= target || (tokens <= max && undersized) {
                buffer = candidate;
                fresh = true;
                continue;
            }

            if !undersized {
                let seed = self.overlap_seed(&buffer);
                chunks.push(std::mem::replace(&mut buffer, seed));
                fresh = false;
                pending.push_front(unit);
                continue;
            }

            // Too small to close, too big to take whole: take part of the unit
            let limit = if fresh { target } else { max };
            match self.split_to_fit(&buffer, unit, limit) {
                Some((head, tail)) => {
                    buffer = join(&buffer, unit.sep, head);
                    fresh = true;
                    pending.push_front(Unit {
                        text: tail,
                        sep: SENTENCE_BREAK,
                    });
                }
                None if fresh => {
                    warn!(tokens = self.count(&buffer), min, "Closing undersized chunk");
                    let seed = self.overlap_seed(&buffer);
                    chunks.push(std::mem::replace(&mut buffer, seed));
                    fresh = false;
                    pending.push_front(unit);
                }
                None => {
                    warn!("Unit does not fit beside the overlap seed, dropping overlap");
                    buffer.clear();
                    pending.push_front(unit);
                }
            }
        }

        if fresh {
            chunks.push(buffer);
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_common::config::TokenCounterKind;
    use docqa_common::tokens::WhitespaceTokenCounter;
    use uuid::Uuid;

    fn config(target: usize, min: usize, max: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            target_tokens: target,
            min_chunk_tokens: min,
            max_chunk_tokens: max,
            overlap_tokens: overlap,
            token_counter: TokenCounterKind::Whitespace,
        }
    }

    fn segmenter(config: ChunkingConfig) -> Segmenter {
        Segmenter::new(Arc::new(WhitespaceTokenCounter), config)
    }

    fn metadata() -> ChunkMetadata {
        ChunkMetadata::new(Uuid::nil(), "doc.txt")
    }

    /// Paragraph of `words` words, each sentence eight words long
    fn paragraph(tag: &str, words: usize) -> String {
        (0..words)
            .map(|i| {
                if i % 8 == 7 || i + 1 == words {
                    format!("{}{}.", tag, i)
                } else {
                    format!("{}{}", tag, i)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn document(sizes: &[usize]) -> String {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| paragraph(&format!("p{}w", i), n))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn test_empty_text() {
        let segmenter = Segmenter::from_config(&ChunkingConfig::default());
        assert!(segmenter.segment("", &metadata()).is_empty());
        assert!(segmenter.segment("  \n\n\t \n ", &metadata()).is_empty());
    }

    #[test]
    fn test_single_paragraph_is_one_chunk() {
        let text = paragraph("w", 450);
        let chunks = segmenter(config(500, 100, 750, 50)).segment(&text, &metadata());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 450);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].sequence_index, 0);
    }

    #[test]
    fn test_packs_paragraphs_up_to_target() {
        let text = document(&[200, 200, 200, 200]);
        let chunks = segmenter(config(500, 100, 750, 50)).segment(&text, &metadata());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].token_count, 400);
        assert!(chunks[0].text.contains("\n\n"));
        assert!(chunks[1].text.starts_with(&words(&chunks[0].text)[350..].join(" ")));
        assert_eq!(chunks[1].token_count, 450);
    }

    #[test]
    fn test_size_invariant() {
        let cfg = config(500, 100, 750, 50);
        let text = document(&[30, 480, 12, 900, 260, 75, 2000, 5, 640, 333, 40]);
        let chunks = segmenter(cfg.clone()).segment(&text, &metadata());

        assert!(chunks.len() > 5);
        let (last, rest) = chunks.split_last().unwrap();
        for chunk in rest {
            assert!(
                chunk.token_count >= cfg.min_chunk_tokens && chunk.token_count <= cfg.max_chunk_tokens,
                "chunk {} has {} tokens",
                chunk.sequence_index,
                chunk.token_count
            );
        }
        assert!(last.token_count <= cfg.max_chunk_tokens);
    }

    #[test]
    fn test_overlap_invariant() {
        let cfg = config(500, 100, 750, 50);
        let text = document(&[30, 480, 12, 900, 260, 75, 2000, 5, 640, 333, 40]);
        let chunks = segmenter(cfg.clone()).segment(&text, &metadata());

        for pair in chunks.windows(2) {
            let prev = words(&pair[0].text);
            let next = words(&pair[1].text);
            assert_eq!(
                &prev[prev.len() - cfg.overlap_tokens..],
                &next[..cfg.overlap_tokens],
                "chunks {} and {} do not overlap",
                pair[0].sequence_index,
                pair[1].sequence_index
            );
        }
    }

    #[test]
    fn test_covers_all_words_in_order() {
        let cfg = config(500, 100, 750, 50);
        let text = document(&[700, 120, 1500]);
        let chunks = segmenter(cfg.clone()).segment(&text, &metadata());

        let mut rebuilt: Vec<&str> = words(&chunks[0].text);
        for chunk in &chunks[1..] {
            rebuilt.extend(words(&chunk.text).into_iter().skip(cfg.overlap_tokens));
        }
        assert_eq!(rebuilt, words(&text));
    }

    #[test]
    fn test_idempotent() {
        let text = document(&[300, 12, 900, 44, 510]);
        let segmenter = segmenter(config(500, 100, 750, 50));
        let first = segmenter.segment(&text, &metadata());
        let second = segmenter.segment(&text, &metadata());
        assert_eq!(first, second);
    }

    #[test]
    fn test_oversized_sentence_is_hard_split() {
        let sentence = (0..1600).map(|i| format!("x{}", i)).collect::<Vec<_>>().join(" ");
        let cfg = config(500, 100, 750, 50);
        let chunks = segmenter(cfg.clone()).segment(&sentence, &metadata());

        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.token_count <= cfg.max_chunk_tokens));
    }

    #[test]
    fn test_hard_split_runs_are_full_with_long_words() {
        let segmenter = segmenter(config(500, 100, 750, 50));
        let text = (0..2_000)
            .map(|i| format!("supercalifragilistic{:05}", i))
            .collect::<Vec<_>>()
            .join(" ");

        let pieces = segmenter.hard_split(&text, 300);
        let sizes: Vec<usize> = pieces.iter().map(|p| words(p).len()).collect();
        assert_eq!(sizes, vec![300, 300, 300, 300, 300, 300, 200]);
        assert_eq!(pieces.join(" "), text);
    }

    #[test]
    fn test_hard_split_keeps_oversized_word() {
        let segmenter = Segmenter::from_config(&ChunkingConfig::default());
        let giant = "x".repeat(4_000);
        let text = format!("a {} b", giant);
        assert_eq!(segmenter.hard_split(&text, 700), vec!["a", giant.as_str(), "b"]);
    }

    #[test]
    fn test_metadata_and_sequence() {
        let doc = Uuid::new_v4();
        let meta = ChunkMetadata::new(doc, "notes.md").with_file_type("md");
        let chunks = segmenter(config(500, 100, 750, 50)).segment(&document(&[400, 400, 400]), &meta);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
            assert_eq!(chunk.metadata.document_id, doc);
            assert_eq!(chunk.passage_id(), format!("{}_{}", doc, i));
        }
    }

    #[test]
    fn test_helpers() {
        assert_eq!(split_paragraphs("a\n\n b \n \n\nc\n"), vec!["a", "b", "c"]);
        assert_eq!(
            split_sentences("One. Two? Three! 3.5 stays. Tail"),
            vec!["One.", "Two?", "Three!", "3.5 stays.", "Tail"]
        );
        assert_eq!(word_spans(" ab  c"), vec![(1, 3), (5, 6)]);
    }

    #[test]
    fn test_estimate_counter() {
        let segmenter = Segmenter::from_config(&ChunkingConfig::default());
        let text = "word ".repeat(4000);
        let chunks = segmenter.segment(&text, &metadata());

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.token_count <= 750));
    }
}
