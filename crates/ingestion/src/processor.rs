//! Ingestion processor
//!
//! Core logic for indexing one document: content hash, duplicate check,
//! segmentation, batch embedding and index insertion.

use crate::chunker::Segmenter;
use crate::errors::IngestionError;
use docqa_common::config::{AppConfig, IngestionConfig};
use docqa_common::errors::AppError;
use docqa_common::metrics;
use docqa_common::models::{ChunkMetadata, IndexedChunk};
use docqa_common::{Embedder, RetrievalIndex};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Result of ingesting one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Indexed { document_id: Uuid, chunks: usize },
    /// Same content was indexed before; nothing was added
    Duplicate { document_id: Uuid },
}

impl IngestOutcome {
    pub fn document_id(&self) -> Uuid {
        match self {
            IngestOutcome::Indexed { document_id, .. } | IngestOutcome::Duplicate { document_id } => *document_id,
        }
    }
}

/// Hex SHA-256 of the document content
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Ingestion processor
pub struct IngestionProcessor {
    segmenter: Segmenter,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn RetrievalIndex>,
    limits: IngestionConfig,
    max_upload_bytes: u64,
    batch_size: usize,
}

impl IngestionProcessor {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn RetrievalIndex>, config: &AppConfig) -> Self {
        Self {
            segmenter: Segmenter::from_config(&config.chunking),
            embedder,
            index,
            limits: config.ingestion.clone(),
            max_upload_bytes: config.max_upload_bytes(),
            batch_size: config.embedding.batch_size.max(1),
        }
    }

    /// Index a document's text unless identical content is already indexed
    #[instrument(skip(self, text, metadata), fields(filename = %metadata.filename, document_id = %metadata.document_id))]
    pub async fn ingest(&self, text: &str, metadata: ChunkMetadata) -> Result<IngestOutcome, IngestionError> {
        let start = Instant::now();

        let hash = content_hash(text);
        if let Some(document_id) = self.index.exists_by_hash(&hash).await? {
            info!(%document_id, "Document already indexed, skipping");
            return Ok(IngestOutcome::Duplicate { document_id });
        }

        let metadata = metadata.with_file_hash(hash);
        let chunks = self.segmenter.segment(text, &metadata);
        if chunks.is_empty() {
            return Err(IngestionError::EmptyDocument {
                filename: metadata.filename,
            });
        }

        let embeddings = self.embed(chunks.iter().map(|c| c.text.clone()).collect()).await?;
        if embeddings.len() != chunks.len() {
            return Err(IngestionError::EmbeddingCountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let chunk_count = chunks.len();
        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk::new(chunk, embedding))
            .collect();
        self.index.add(indexed).await?;

        let file_type = metadata.file_type.as_deref().unwrap_or("txt");
        metrics::record_ingestion(start.elapsed().as_secs_f64(), chunk_count, file_type);
        info!(
            chunks = chunk_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Document indexed"
        );

        Ok(IngestOutcome::Indexed {
            document_id: metadata.document_id,
            chunks: chunk_count,
        })
    }

    /// Embed texts in batches, keeping input order
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, IngestionError> {
        let batches: Vec<Vec<String>> = texts.chunks(self.batch_size).map(<[String]>::to_vec).collect();
        debug!(batches = batches.len(), batch_size = self.batch_size, "Embedding chunks");

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| {
                let embedder = Arc::clone(&self.embedder);
                async move { embedder.embed_batch(&batch).await }
            })
            .buffered(self.limits.embed_concurrency.max(1))
            .try_collect()
            .await?;

        Ok(embedded.into_iter().flatten().collect())
    }

    /// Read and index a text file, enforcing the configured intake limits
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome, IngestionError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !self.limits.allowed_extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension)) {
            return Err(AppError::UnsupportedFileType { extension }.into());
        }

        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestionError::FileNotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if size > self.max_upload_bytes {
            return Err(AppError::PayloadTooLarge {
                size: size as usize,
                limit: self.max_upload_bytes as usize,
            }
            .into());
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IngestionError::InvalidFileName(path.display().to_string()))?
            .to_string();
        let text = tokio::fs::read_to_string(path).await?;

        let metadata = ChunkMetadata::new(Uuid::new_v4(), filename).with_file_type(extension);
        self.ingest(&text, metadata).await
    }

    /// Ingest every file in a directory; failures are logged and skipped
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn ingest_directory(&self, dir: &Path) -> Result<Vec<(PathBuf, IngestOutcome)>, IngestionError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut results = Vec::new();
        for path in paths {
            match self.ingest_file(&path).await {
                Ok(outcome) => results.push((path, outcome)),
                Err(e) => error!(
                    path = %path.display(),
                    error = %e,
                    code = ?e.code(),
                    transient = e.is_transient(),
                    "Failed to ingest file"
                ),
            }
        }

        info!(total = results.len(), "Directory processing complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_common::config::TokenCounterKind;
    use docqa_common::embeddings::HashingEmbedder;
    use docqa_common::index::InMemoryIndex;
    use tokio_test::assert_ok;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.chunking.token_counter = TokenCounterKind::Whitespace;
        config.embedding.batch_size = 2;
        config
    }

    fn processor(index: Arc<InMemoryIndex>) -> IngestionProcessor {
        IngestionProcessor::new(Arc::new(HashingEmbedder::new(32)), index, &config())
    }

    fn long_text() -> String {
        (0..6)
            .map(|p| {
                (0..300)
                    .map(|w| format!("p{}w{}", p, w))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[tokio::test]
    async fn test_ingest_indexes_chunks() {
        let index = Arc::new(InMemoryIndex::new("documents"));
        let processor = processor(index.clone());
        let doc = Uuid::new_v4();

        let outcome = processor
            .ingest(&long_text(), ChunkMetadata::new(doc, "long.txt").with_file_type("txt"))
            .await
            .unwrap();

        let IngestOutcome::Indexed { document_id, chunks } = outcome else {
            panic!("expected Indexed, got {:?}", outcome);
        };
        assert_eq!(document_id, doc);
        assert!(chunks > 2);
        assert_eq!(index.count().await.unwrap(), chunks);

        let documents = index.list_documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].chunks, chunks);
    }

    #[tokio::test]
    async fn test_duplicate_content_is_detected() {
        let index = Arc::new(InMemoryIndex::new("documents"));
        let processor = processor(index.clone());
        let first = Uuid::new_v4();

        assert_ok!(processor.ingest(&long_text(), ChunkMetadata::new(first, "a.txt")).await);
        let count = index.count().await.unwrap();

        let outcome = processor
            .ingest(&long_text(), ChunkMetadata::new(Uuid::new_v4(), "copy.txt"))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Duplicate { document_id: first });
        assert_eq!(index.count().await.unwrap(), count);
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let processor = processor(Arc::new(InMemoryIndex::new("documents")));
        let result = processor.ingest(" \n\n ", ChunkMetadata::new(Uuid::new_v4(), "blank.txt")).await;
        assert!(matches!(result, Err(IngestionError::EmptyDocument { .. })));
    }

    #[tokio::test]
    async fn test_file_limits() {
        let dir = std::env::temp_dir().join(format!("docqa-ingest-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let processor = processor(Arc::new(InMemoryIndex::new("documents")));

        let pdf = dir.join("paper.pdf");
        tokio::fs::write(&pdf, b"%PDF-1.7").await.unwrap();
        assert!(matches!(
            processor.ingest_file(&pdf).await,
            Err(IngestionError::Common(AppError::UnsupportedFileType { .. }))
        ));

        assert!(matches!(
            processor.ingest_file(&dir.join("missing.txt")).await,
            Err(IngestionError::FileNotFound(_))
        ));

        let notes = dir.join("Notes.MD");
        tokio::fs::write(&notes, "Quarterly revenue grew by twelve percent.").await.unwrap();
        let outcome = processor.ingest_file(&notes).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Indexed { chunks: 1, .. }));

        let results = processor.ingest_directory(&dir).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, IngestOutcome::Duplicate { .. }));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
