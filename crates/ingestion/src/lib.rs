//! DocQA Ingestion
//!
//! Turns documents into indexed chunks:
//! 1. Hashes the content and skips documents already indexed
//! 2. Segments the text into overlapping token-bounded chunks
//! 3. Embeds the chunks in concurrent batches
//! 4. Adds them to the retrieval index

pub mod chunker;
pub mod errors;
pub mod processor;

pub use chunker::Segmenter;
pub use errors::IngestionError;
pub use processor::{IngestOutcome, IngestionProcessor};
