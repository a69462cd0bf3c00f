//! Ingestion pipeline: documents in, a queryable [`KnowledgeBase`] out.
//!
//! ```rust,ignore
//! use koi_rag::{DocumentLoader, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .build()?;
//!
//! let report = DocumentLoader::new().load_directory("data")?;
//! let knowledge = pipeline.build_knowledge_base(&report.documents).await?;
//! let results = knowledge.retrieve("What is the refund policy?").await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::dense::{DenseIndex, EmbedOptions};
use crate::document::{Chunk, Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::hybrid::{HybridRetriever, RetrievalStrategy};
use crate::keyword::KeywordIndex;

/// Chunks documents and builds both indices over them.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
}

impl RagPipeline {
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Chunk every document, preserving document order.
    pub fn chunk(&self, documents: &[Document]) -> Vec<Chunk> {
        self.chunker.chunk_all(documents)
    }

    /// Chunk and index `documents`.
    ///
    /// The result is only returned once both indices are complete, so a
    /// caller swapping it in never exposes a half-built index.
    ///
    /// # Errors
    ///
    /// [`RagError::EmptyIndexError`] if the documents yield no chunks, and
    /// any embedding or keyword indexing failure.
    pub async fn build_knowledge_base(&self, documents: &[Document]) -> Result<KnowledgeBase> {
        let chunks = self.chunk(documents);
        info!(documents = documents.len(), chunks = chunks.len(), "documents chunked");
        self.index_chunks(chunks).await
    }

    /// Index an already-chunked set.
    pub async fn index_chunks(&self, chunks: Vec<Chunk>) -> Result<KnowledgeBase> {
        if chunks.is_empty() {
            return Err(RagError::EmptyIndexError);
        }

        let dense = DenseIndex::build(
            chunks,
            Arc::clone(&self.embedding_provider),
            EmbedOptions::from(&self.config),
        )
        .await
        .inspect_err(|e| error!(error = %e, "dense indexing failed"))?;

        self.assemble(dense).await
    }

    /// Restore a knowledge base from a saved dense index. The keyword index
    /// is rebuilt from the restored chunks.
    pub async fn load_knowledge_base(&self, path: impl AsRef<Path>) -> Result<KnowledgeBase> {
        let dense = DenseIndex::load(
            path,
            Arc::clone(&self.embedding_provider),
            self.config.service_timeout(),
        )?;
        if dense.is_empty() {
            return Err(RagError::EmptyIndexError);
        }
        self.assemble(dense).await
    }

    async fn assemble(&self, dense: DenseIndex) -> Result<KnowledgeBase> {
        let pool: Vec<Chunk> = match self.config.keyword_pool_size {
            Some(size) if size < dense.len() => dense
                .query(&self.config.keyword_pool_query, size)
                .await?
                .into_iter()
                .map(|r| r.chunk)
                .collect(),
            _ => dense.chunks().cloned().collect(),
        };
        let keyword = KeywordIndex::build(pool)?;

        let dense = Arc::new(dense);
        let keyword = Arc::new(keyword);
        let retriever =
            HybridRetriever::new(Arc::clone(&dense), Arc::clone(&keyword), self.config.retrieval)
                .with_similarity_threshold(self.config.similarity_threshold);

        info!(
            chunks = dense.len(),
            keyword_chunks = keyword.len(),
            strategy = ?self.config.retrieval,
            "knowledge base ready"
        );
        Ok(KnowledgeBase { dense, keyword, retriever, top_k: self.config.top_k })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding provider is required. The config defaults to
/// [`RagConfig::default()`] and the chunker to a [`RecursiveChunker`] built
/// from the config.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedding provider is missing
    /// or the config does not validate.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));

        Ok(RagPipeline { config, embedding_provider, chunker })
    }
}

/// Indexed chunks of one document set, ready for retrieval.
///
/// Cheap to clone; the indices are shared.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    dense: Arc<DenseIndex>,
    keyword: Arc<KeywordIndex>,
    retriever: HybridRetriever,
    top_k: usize,
}

impl KnowledgeBase {
    /// The configured `top_k` most relevant chunks for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.retriever.query(query, self.top_k).await
    }

    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.retriever.query(query, k).await
    }

    pub fn strategy(&self) -> RetrievalStrategy {
        self.retriever.strategy()
    }

    pub fn chunk_count(&self) -> usize {
        self.dense.len()
    }

    /// Chunks covered by the keyword index.
    pub fn keyword_chunk_count(&self) -> usize {
        self.keyword.len()
    }

    /// Distinct `source` names of the indexed chunks, in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for chunk in self.dense.chunks() {
            if let Some(source) = chunk.metadata.get("source") {
                if !sources.contains(source) {
                    sources.push(source.clone());
                }
            }
        }
        sources
    }

    pub fn dense(&self) -> &DenseIndex {
        &self.dense
    }

    /// Persist the dense index. See [`RagPipeline::load_knowledge_base`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.dense.save(path)
    }
}
