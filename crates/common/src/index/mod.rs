//! Retrieval index contract
//!
//! The index persists chunks with their vectors, answers nearest-neighbour
//! queries by cosine distance and tracks documents by content hash.

mod memory;

pub use memory::InMemoryIndex;

use crate::errors::Result;
use crate::models::{Chunk, DocumentSummary, IndexedChunk};
use async_trait::async_trait;
use uuid::Uuid;

/// One nearest-neighbour hit
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk: Chunk,

    /// Cosine distance in [0, 2]; 0 is identical
    pub distance: f32,
}

/// Common trait for retrieval index backends
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Store chunks with their embeddings
    async fn add(&self, chunks: Vec<IndexedChunk>) -> Result<()>;

    /// Nearest chunks to `vector`, closest first
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>>;

    /// Document already indexed under this content hash, if any
    async fn exists_by_hash(&self, hash: &str) -> Result<Option<Uuid>>;

    /// Remove every chunk of a document, returning how many were removed
    async fn delete(&self, document_id: Uuid) -> Result<usize>;

    /// Total chunks stored
    async fn count(&self) -> Result<usize>;

    /// Documents currently indexed
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    /// Remove everything, returning how many chunks were removed
    async fn clear(&self) -> Result<usize>;
}
