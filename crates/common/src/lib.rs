//! DocQA Common Library
//!
//! Shared code for the DocQA services including:
//! - Collaborator contracts (token counter, embedder, language model, retrieval index)
//! - The five-stage reasoning pipeline
//! - Chunk and answer models
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod safety;
pub mod tokens;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::RetrievalIndex;
pub use llm::LanguageModel;
pub use models::{Chunk, ChunkMetadata};
pub use pipeline::{Answer, AnswerStyle, Confidence, Pipeline, SafetyFlag};
pub use tokens::TokenCounter;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension for the offline hashing embedder
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
