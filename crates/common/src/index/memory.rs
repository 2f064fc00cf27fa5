//! In-process cosine index with JSON snapshots

use super::{IndexHit, RetrievalIndex};
use crate::errors::{AppError, Result};
use crate::models::{Chunk, DocumentSummary, IndexedChunk};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// On-disk snapshot layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    collection: String,
    chunks: Vec<IndexedChunk>,
}

/// Identity behind `Chunk::passage_id`, without formatting it
fn passage_key(chunk: &Chunk) -> (Uuid, usize) {
    (chunk.metadata.document_id, chunk.sequence_index)
}

/// Brute-force cosine index held in memory
pub struct InMemoryIndex {
    collection: String,
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryIndex {
    /// Create an empty index
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Load a snapshot, or start empty when the file does not exist yet
    pub async fn load(path: &Path, collection: &str) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            info!(path = %path.display(), "No index snapshot found, starting empty");
            return Ok(Self::new(collection));
        }

        let bytes = tokio::fs::read(path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.collection != collection {
            return Err(AppError::Index {
                message: format!(
                    "snapshot {} holds collection '{}', expected '{}'",
                    path.display(),
                    snapshot.collection,
                    collection
                ),
            });
        }

        info!(
            path = %path.display(),
            chunks = snapshot.chunks.len(),
            "Index snapshot loaded"
        );

        Ok(Self {
            collection: snapshot.collection,
            chunks: RwLock::new(snapshot.chunks),
        })
    }

    /// Write the current contents to `path`, replacing any previous snapshot
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let chunks = self.chunks.read().await;
        let snapshot = SnapshotRef {
            collection: &self.collection,
            chunks: &chunks,
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        drop(chunks);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), bytes = bytes.len(), "Index snapshot written");
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    collection: &'a str,
    chunks: &'a [IndexedChunk],
}

/// Cosine distance, 1 - cos(a, b); mismatched or zero vectors are maximally distant from 1
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 1.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl RetrievalIndex for InMemoryIndex {
    async fn add(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut stored = self.chunks.write().await;
        let dimension = stored.first().unwrap_or(&chunks[0]).embedding.len();
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dimension) {
            return Err(AppError::Index {
                message: format!(
                    "embedding dimension {} does not match index dimension {}",
                    bad.embedding.len(),
                    dimension
                ),
            });
        }

        let added = chunks.len();
        let keys: HashSet<(Uuid, usize)> = chunks.iter().map(|c| passage_key(&c.chunk)).collect();
        stored.retain(|existing| !keys.contains(&passage_key(&existing.chunk)));
        stored.extend(chunks);

        debug!(added, total = stored.len(), "Chunks added to index");
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>> {
        let stored = self.chunks.read().await;

        let mut hits: Vec<IndexHit> = stored
            .iter()
            .map(|c| IndexHit {
                chunk: c.chunk.clone(),
                distance: cosine_distance(vector, &c.embedding),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn exists_by_hash(&self, hash: &str) -> Result<Option<Uuid>> {
        let stored = self.chunks.read().await;
        Ok(stored
            .iter()
            .find(|c| c.chunk.metadata.file_hash.as_deref() == Some(hash))
            .map(|c| c.chunk.metadata.document_id))
    }

    async fn delete(&self, document_id: Uuid) -> Result<usize> {
        let mut stored = self.chunks.write().await;
        let before = stored.len();
        stored.retain(|c| c.chunk.metadata.document_id != document_id);
        let removed = before - stored.len();

        info!(%document_id, removed, "Deleted document from index");
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().await.len())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let stored = self.chunks.read().await;
        let mut documents: BTreeMap<Uuid, DocumentSummary> = BTreeMap::new();

        for c in stored.iter() {
            let meta = &c.chunk.metadata;
            let entry = documents.entry(meta.document_id).or_insert_with(|| DocumentSummary {
                document_id: meta.document_id,
                filename: meta.filename.clone(),
                file_type: meta.file_type.clone(),
                chunks: 0,
                indexed_at: c.indexed_at,
            });
            entry.chunks += 1;
            entry.indexed_at = entry.indexed_at.min(c.indexed_at);
        }

        let mut documents: Vec<DocumentSummary> = documents.into_values().collect();
        documents.sort_by(|a, b| a.indexed_at.cmp(&b.indexed_at).then(a.filename.cmp(&b.filename)));
        Ok(documents)
    }

    async fn clear(&self) -> Result<usize> {
        let mut stored = self.chunks.write().await;
        let removed = stored.len();
        stored.clear();

        info!(removed, collection = %self.collection, "Cleared all documents");
        Ok(removed)
    }
}
