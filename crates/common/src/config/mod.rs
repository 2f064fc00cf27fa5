//! Configuration management for DocQA services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values
//!
//! Every section has defaults, so an empty environment yields a working
//! offline setup (hashing embedder, extractive model, local snapshot).

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Most passages a single question may retrieve
pub const TOP_K_LIMIT: usize = 20;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Embedding gateway configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Language-model gateway configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Segmenter configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Reasoning pipeline policy
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Retrieval index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Document intake limits
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (used by the offline hashing embedder)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient provider failures
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Completion provider: openai, extractive
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the completion service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

/// How chunk sizes are measured
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenCounterKind {
    /// Roughly four characters per token
    Estimate,
    /// One token per whitespace-separated word
    Whitespace,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Size the segmenter aims for when packing paragraphs
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,

    /// Smallest chunk emitted before the end of a document
    #[serde(default = "default_min_chunk_tokens")]
    pub min_chunk_tokens: usize,

    /// Hard upper bound for every chunk
    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: usize,

    /// Tokens shared between consecutive chunks
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,

    /// Token counter used for every size decision
    #[serde(default = "default_token_counter")]
    pub token_counter: TokenCounterKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Passages retrieved when the caller does not say
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Upper bound for caller-supplied top_k
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    /// Questions shorter than this are answered with a request for detail
    #[serde(default = "default_min_question_chars")]
    pub min_question_chars: usize,

    /// Longest question accepted at the outer boundary
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,

    /// Characters of each passage placed in the prompt
    #[serde(default = "default_context_chars")]
    pub context_chars_per_passage: usize,

    /// Drafts shorter than this are rejected
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,

    /// Sampling temperature for answer generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output budget for answer generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Mean similarity above which an unhedged answer is high confidence
    #[serde(default = "default_high_confidence")]
    pub high_confidence_threshold: f32,

    /// Mean similarity above which an answer is medium confidence
    #[serde(default = "default_medium_confidence")]
    pub medium_confidence_threshold: f32,

    /// Words that mark a draft as uncertain
    #[serde(default = "default_hedging_phrases")]
    pub hedging_phrases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// JSON snapshot of the in-process index
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Logical collection name
    #[serde(default = "default_collection")]
    pub collection: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Largest accepted document in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,

    /// File extensions accepted for text ingestion
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Embedding batches in flight per document
    #[serde(default = "default_embed_concurrency")]
    pub embed_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_gateway_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 64 }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_target_tokens() -> usize { 500 }
fn default_min_chunk_tokens() -> usize { 100 }
fn default_max_chunk_tokens() -> usize { 750 }
fn default_overlap_tokens() -> usize { 50 }
fn default_token_counter() -> TokenCounterKind { TokenCounterKind::Estimate }
fn default_top_k() -> usize { 5 }
fn default_max_top_k() -> usize { 20 }
fn default_min_question_chars() -> usize { 10 }
fn default_max_question_chars() -> usize { 1000 }
fn default_context_chars() -> usize { 500 }
fn default_min_answer_chars() -> usize { 20 }
fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> usize { 500 }
fn default_high_confidence() -> f32 { 0.8 }
fn default_medium_confidence() -> f32 { 0.6 }
fn default_hedging_phrases() -> Vec<String> {
    ["might", "possibly", "perhaps", "unclear", "not sure"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_snapshot_path() -> PathBuf { PathBuf::from("./data/index.json") }
fn default_collection() -> String { "documents".to_string() }
fn default_max_upload_mb() -> u64 { 10 }
fn default_allowed_extensions() -> Vec<String> { vec!["txt".to_string(), "md".to_string()] }
fn default_embed_concurrency() -> usize { 4 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "docqa".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__CHUNKING__TARGET_TOKENS=400
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("pipeline.hedging_phrases")
                    .with_list_parse_key("ingestion.allowed_extensions")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline and segmenter cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;

        let p = &self.pipeline;
        if p.max_top_k == 0 || p.max_top_k > TOP_K_LIMIT {
            return Err(ConfigError::Message(format!(
                "pipeline.max_top_k must lie in [1, {}]",
                TOP_K_LIMIT
            )));
        }
        if p.default_top_k == 0 || p.default_top_k > p.max_top_k {
            return Err(ConfigError::Message(format!(
                "pipeline.default_top_k must lie in [1, {}]",
                p.max_top_k
            )));
        }
        if p.medium_confidence_threshold > p.high_confidence_threshold {
            return Err(ConfigError::Message(
                "pipeline.medium_confidence_threshold exceeds high_confidence_threshold".into(),
            ));
        }
        Ok(())
    }

    /// Largest accepted document in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.ingestion.max_upload_mb * 1024 * 1024
    }
}

impl EmbeddingConfig {
    /// Embedding request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmConfig {
    /// Completion request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ChunkingConfig {
    /// Check the size bounds are mutually consistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_chunk_tokens == 0 {
            return Err(ConfigError::Message("chunking.min_chunk_tokens must be positive".into()));
        }
        if !(self.min_chunk_tokens <= self.target_tokens && self.target_tokens <= self.max_chunk_tokens) {
            return Err(ConfigError::Message(format!(
                "chunking bounds must satisfy min ({}) <= target ({}) <= max ({})",
                self.min_chunk_tokens, self.target_tokens, self.max_chunk_tokens
            )));
        }
        if self.overlap_tokens >= self.min_chunk_tokens {
            return Err(ConfigError::Message(format!(
                "chunking.overlap_tokens ({}) must be smaller than min_chunk_tokens ({})",
                self.overlap_tokens, self.min_chunk_tokens
            )));
        }
        Ok(())
    }

    /// Largest unit that still fits after an overlap seed
    pub fn max_unit_tokens(&self) -> usize {
        self.max_chunk_tokens - self.overlap_tokens
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_gateway_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            min_chunk_tokens: default_min_chunk_tokens(),
            max_chunk_tokens: default_max_chunk_tokens(),
            overlap_tokens: default_overlap_tokens(),
            token_counter: default_token_counter(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            min_question_chars: default_min_question_chars(),
            max_question_chars: default_max_question_chars(),
            context_chars_per_passage: default_context_chars(),
            min_answer_chars: default_min_answer_chars(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            high_confidence_threshold: default_high_confidence(),
            medium_confidence_threshold: default_medium_confidence(),
            hedging_phrases: default_hedging_phrases(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            collection: default_collection(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: default_max_upload_mb(),
            allowed_extensions: default_allowed_extensions(),
            embed_concurrency: default_embed_concurrency(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.chunking.target_tokens, 500);
        assert_eq!(config.pipeline.min_question_chars, 10);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config: AppConfig = Config::builder()
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();
        assert_eq!(config.pipeline.max_top_k, 20);
        assert_eq!(config.pipeline.hedging_phrases.len(), 5);
        assert_eq!(config.index.collection, "documents");
    }

    #[test]
    fn test_chunking_bounds_rejected() {
        let mut chunking = ChunkingConfig::default();
        chunking.target_tokens = 900;
        assert!(chunking.validate().is_err());

        let mut chunking = ChunkingConfig::default();
        chunking.overlap_tokens = 100;
        assert!(chunking.validate().is_err());
    }

    #[test]
    fn test_max_unit_tokens() {
        let chunking = ChunkingConfig::default();
        assert_eq!(chunking.max_unit_tokens(), 700);
    }

    #[test]
    fn test_max_top_k_is_bounded() {
        let mut config = AppConfig::default();
        config.pipeline.max_top_k = TOP_K_LIMIT + 1;
        assert!(config.validate().is_err());

        config.pipeline.max_top_k = 0;
        config.pipeline.default_top_k = 0;
        assert!(config.validate().is_err());

        config.pipeline.max_top_k = TOP_K_LIMIT;
        config.pipeline.default_top_k = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gateway_timeouts() {
        let mut config = AppConfig::default();
        config.llm.timeout_secs = 45;
        assert_eq!(config.embedding.timeout(), Duration::from_secs(30));
        assert_eq!(config.llm.timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_upload_limit() {
        let config = AppConfig::default();
        assert_eq!(config.max_upload_bytes(), 10 * 1024 * 1024);
    }
}
