//! Ingestion error types

use docqa_common::errors::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Document {filename} contains no text")]
    EmptyDocument { filename: String },

    #[error("File name is not valid UTF-8: {0}")]
    InvalidFileName(String),

    #[error("Embedder returned {actual} vectors for {expected} chunks")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error(transparent)]
    Common(#[from] AppError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IngestionError {
    /// Machine-readable code reported alongside a failed file
    pub fn code(&self) -> ErrorCode {
        match self {
            IngestionError::EmptyDocument { .. } | IngestionError::InvalidFileName(_) => ErrorCode::ValidationError,
            IngestionError::EmbeddingCountMismatch { .. } => ErrorCode::EmbeddingError,
            IngestionError::FileNotFound(_) => ErrorCode::DocumentNotFound,
            IngestionError::Common(e) => e.code(),
            IngestionError::IoError(_) => ErrorCode::IoError,
        }
    }

    /// Whether retrying the same document could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            IngestionError::Common(e) => e.is_transient(),
            _ => false,
        }
    }
}
