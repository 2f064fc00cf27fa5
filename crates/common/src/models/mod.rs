//! Chunk models shared by the segmenter, the index and the pipeline

mod chunk;

pub use chunk::{Chunk, ChunkMetadata, DocumentSummary, IndexedChunk, Locator};
