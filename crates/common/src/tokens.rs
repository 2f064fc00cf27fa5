//! Token counting
//!
//! The segmenter measures every size decision through a [`TokenCounter`].
//! Counters are pure and total: same text, same count, no failure mode.

use crate::config::TokenCounterKind;
use std::sync::Arc;

/// Pure token counting function
pub trait TokenCounter: Send + Sync {
    /// Count the tokens in `text`
    fn count(&self, text: &str) -> usize;

    /// Counter name for logs
    fn name(&self) -> &str;
}

/// Approximates tokens as four characters each
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateTokenCounter;

impl EstimateTokenCounter {
    pub const CHARS_PER_TOKEN: usize = 4;
}

impl TokenCounter for EstimateTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count() / Self::CHARS_PER_TOKEN
    }

    fn name(&self) -> &str {
        "estimate"
    }
}

/// Counts whitespace-separated words
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}

/// Create a counter based on configuration
pub fn create_token_counter(kind: TokenCounterKind) -> Arc<dyn TokenCounter> {
    match kind {
        TokenCounterKind::Estimate => Arc::new(EstimateTokenCounter),
        TokenCounterKind::Whitespace => Arc::new(WhitespaceTokenCounter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_counter() {
        let counter = EstimateTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count(&"x".repeat(2000)), 500);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        let counter = EstimateTokenCounter;
        assert_eq!(counter.count("éééé"), 1);
    }

    #[test]
    fn test_whitespace_counter() {
        let counter = WhitespaceTokenCounter;
        assert_eq!(counter.count("  one two\n\nthree  "), 3);
        assert_eq!(counter.count("   "), 0);
    }

    #[test]
    fn test_factory() {
        assert_eq!(create_token_counter(TokenCounterKind::Whitespace).name(), "whitespace");
        assert_eq!(create_token_counter(TokenCounterKind::Estimate).name(), "estimate");
    }
}
