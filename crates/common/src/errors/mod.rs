//! Error types for DocQA services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes
//! - Transient/permanent classification for gateway retries
//!
//! The reasoning pipeline itself never surfaces these to its caller; they
//! flow between collaborators and are degraded inside the stages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationError,
    PayloadTooLarge,
    UnsupportedFileType,

    // Resource errors
    DocumentNotFound,

    // External service errors
    UpstreamError,
    EmbeddingError,
    LanguageModelError,
    IndexError,

    // Internal errors
    InternalError,
    ConfigurationError,
    SerializationError,
    IoError,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    // Resource errors
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    #[error("Retrieval index error: {message}")]
    Index { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::UnsupportedFileType { .. } => ErrorCode::UnsupportedFileType,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::LanguageModel { .. } => ErrorCode::LanguageModelError,
            AppError::Index { .. } => ErrorCode::IndexError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Io(_) => ErrorCode::IoError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Check if a gateway call failing with this error may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error() || s.as_u16() == 429)
            }
            AppError::EmbeddingError { .. } | AppError::LanguageModel { .. } => true,
            _ => false,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|k| k.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::DocumentNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::DocumentNotFound);
        assert_eq!(serde_json::to_string(&err.code()).unwrap(), "\"DOCUMENT_NOT_FOUND\"");
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "question too long".into(),
            field: Some("question".into()),
        };
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_gateway_error_transience() {
        let err = AppError::EmbeddingError {
            message: "quota".into(),
        };
        assert_eq!(err.code(), ErrorCode::EmbeddingError);
        assert!(err.is_transient());

        let err = AppError::Index {
            message: "unavailable".into(),
        };
        assert_eq!(err.code(), ErrorCode::IndexError);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: AppError = config::ConfigError::Message("bad".into()).into();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }
}
