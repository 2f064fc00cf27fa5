//! Chunk entity with provenance metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where inside the source file a chunk came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// 1-based page of a paginated document
    Page(u32),
    /// Sheet name of a spreadsheet
    Sheet(String),
}

/// Caller-supplied provenance attached to every chunk of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: Uuid,

    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,

    /// SHA-256 of the source bytes, used for duplicate detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
}

impl ChunkMetadata {
    pub fn new(document_id: Uuid, filename: impl Into<String>) -> Self {
        Self {
            document_id,
            filename: filename.into(),
            file_type: None,
            file_hash: None,
            locator: None,
        }
    }

    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    pub fn with_file_hash(mut self, file_hash: impl Into<String>) -> Self {
        self.file_hash = Some(file_hash.into());
        self
    }

    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn page(&self) -> Option<u32> {
        match &self.locator {
            Some(Locator::Page(page)) => Some(*page),
            _ => None,
        }
    }

    pub fn sheet(&self) -> Option<&str> {
        match &self.locator {
            Some(Locator::Sheet(sheet)) => Some(sheet.as_str()),
            _ => None,
        }
    }
}

/// A bounded span of source text; immutable once segmented
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,

    /// Token count under the segmenter's counter
    pub token_count: usize,

    /// Position within the parent document
    pub sequence_index: usize,

    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Stable identifier of this chunk inside the index
    pub fn passage_id(&self) -> String {
        format!("{}_{}", self.metadata.document_id, self.sequence_index)
    }
}

/// A chunk together with its embedding, as stored by the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,

    pub embedding: Vec<f32>,

    pub indexed_at: DateTime<Utc>,
}

impl IndexedChunk {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            chunk,
            embedding,
            indexed_at: Utc::now(),
        }
    }
}

/// One row of the index's document listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: Uuid,
    pub filename: String,
    pub file_type: Option<String>,
    pub chunks: usize,
    pub indexed_at: DateTime<Utc>,
}
