//! Dense (embedding) index over a fixed chunk set.

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RagConfig;
use crate::document::{Chunk, SearchResult};
use crate::embedding::{EmbeddingProvider, cosine_similarity};
use crate::error::{RagError, Result, with_timeout};

const SNAPSHOT_VERSION: u32 = 1;

/// How chunk embeddings are requested while building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
    pub batch_size: usize,
    /// Batches in flight at once. Results keep chunk order regardless.
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for EmbedOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            batch_size: config.embedding_batch_size,
            concurrency: config.embedding_concurrency,
            timeout: config.service_timeout(),
        }
    }
}

/// A chunk and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimensions: usize,
    entries: Vec<DenseEntry>,
}

/// Brute-force cosine index. Entries keep the order the chunks were given in,
/// which is also the tie-break order for equal scores.
pub struct DenseIndex {
    provider: Arc<dyn EmbeddingProvider>,
    entries: Vec<DenseEntry>,
    timeout: Duration,
}

impl fmt::Debug for DenseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseIndex")
            .field("entries", &self.entries.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DenseIndex {
    /// Embed every chunk and build the index.
    ///
    /// Fails as a whole if any batch fails; nothing is retried.
    pub async fn build(
        chunks: Vec<Chunk>,
        provider: Arc<dyn EmbeddingProvider>,
        options: EmbedOptions,
    ) -> Result<Self> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let provider_ref = provider.as_ref();

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(
            texts.chunks(options.batch_size.max(1)).enumerate().map(|(batch, texts)| async move {
                debug!(batch, size = texts.len(), "embedding batch");
                let vectors =
                    with_timeout("embedding batch", options.timeout, provider_ref.embed_batch(texts))
                        .await?;
                if vectors.len() != texts.len() {
                    return Err(RagError::EmbeddingServiceError {
                        provider: "embedding".to_string(),
                        message: format!(
                            "expected {} vectors for batch {batch}, got {}",
                            texts.len(),
                            vectors.len()
                        ),
                    });
                }
                Ok(vectors)
            }),
        )
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        if let Some(first) = vectors.first() {
            if let Some(bad) = vectors.iter().position(|v| v.len() != first.len()) {
                return Err(RagError::EmbeddingServiceError {
                    provider: "embedding".to_string(),
                    message: format!(
                        "vector {bad} has {} dimensions, expected {}",
                        vectors[bad].len(),
                        first.len()
                    ),
                });
            }
        }

        let entries: Vec<DenseEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| DenseEntry { chunk, vector })
            .collect();

        info!(chunks = entries.len(), "dense index built");
        Ok(Self { provider, entries, timeout: options.timeout })
    }

    /// Embed `text` with the index's provider and return the `k` most similar chunks.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        if self.entries.is_empty() {
            return Err(RagError::EmptyIndexError);
        }
        let vector = with_timeout("query embedding", self.timeout, self.provider.embed(text)).await?;
        Ok(self.search_vector(&vector, k))
    }

    /// Rank stored chunks by cosine similarity to `query`, highest first.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query, &entry.vector)))
            .collect();
        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchResult { chunk: self.entries[i].chunk.clone(), score })
            .collect()
    }

    pub fn entries(&self) -> &[DenseEntry] {
        &self.entries
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write chunks and vectors to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            dimensions: self.entries.first().map_or(0, |e| e.vector.len()),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| RagError::PersistenceError(format!("cannot serialize index: {e}")))?;
        std::fs::write(path, json).map_err(|e| {
            RagError::PersistenceError(format!("cannot write {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), chunks = self.entries.len(), "dense index saved");
        Ok(())
    }

    /// Restore an index written by [`save`](Self::save). Queries will be
    /// embedded with `provider`, which must match the one used to build it.
    pub fn load(
        path: impl AsRef<Path>,
        provider: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            RagError::PersistenceError(format!("cannot read {}: {e}", path.display()))
        })?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::PersistenceError(format!("malformed index file: {e}")))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RagError::PersistenceError(format!(
                "unsupported index version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        let dimensions = snapshot.dimensions;
        if let Some(bad) = snapshot.entries.iter().position(|e| e.vector.len() != dimensions) {
            return Err(RagError::PersistenceError(format!(
                "entry {bad} has {} dimensions but the index declares {dimensions}",
                snapshot.entries[bad].vector.len()
            )));
        }
        if let Some(expected) = provider.dimensions() {
            if !snapshot.entries.is_empty() && expected != dimensions {
                return Err(RagError::PersistenceError(format!(
                    "index holds {dimensions}-dimensional vectors but the embedding provider produces {expected}"
                )));
            }
        }

        info!(path = %path.display(), chunks = snapshot.entries.len(), "dense index loaded");
        Ok(Self { provider, entries: snapshot.entries, timeout })
    }
}
