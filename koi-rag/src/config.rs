//! Configuration for ingestion and retrieval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::hybrid::RetrievalStrategy;

/// Separators tried by the chunker, highest priority first.
pub const DEFAULT_SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of characters repeated between consecutive chunks.
    pub chunk_overlap: usize,
    /// Split points in priority order. A hard cut is used when none fits.
    pub separators: Vec<String>,
    /// Number of chunks handed to the answer synthesizer per query.
    pub top_k: usize,
    /// Texts per embedding request.
    pub embedding_batch_size: usize,
    /// Embedding requests allowed in flight at once.
    pub embedding_concurrency: usize,
    /// When set, the keyword index only covers this many chunks, chosen by
    /// dense similarity to `keyword_pool_query`. `None` indexes every chunk.
    pub keyword_pool_size: Option<usize>,
    pub keyword_pool_query: String,
    pub retrieval: RetrievalStrategy,
    /// Dense hits with a cosine similarity below this are dropped.
    pub similarity_threshold: Option<f32>,
    /// Upper bound on any single call to the embedding service.
    pub service_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            top_k: 5,
            embedding_batch_size: 5,
            embedding_concurrency: 1,
            keyword_pool_size: None,
            keyword_pool_query: String::new(),
            retrieval: RetrievalStrategy::default(),
            similarity_threshold: None,
            service_timeout_secs: 60,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k`, `embedding_batch_size` or `embedding_concurrency` is zero
    /// - fusion weights are negative or sum to zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.embedding_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embedding_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.service_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "service_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if let RetrievalStrategy::Fused { dense_weight, sparse_weight } = self.retrieval {
            if dense_weight < 0.0 || sparse_weight < 0.0 || dense_weight + sparse_weight <= 0.0 {
                return Err(RagError::ConfigError(format!(
                    "fusion weights must be non-negative with a positive sum (got {dense_weight} / {sparse_weight})"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    pub fn embedding_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedding_concurrency = concurrency;
        self
    }

    /// Restrict the keyword index to the `size` chunks closest to `query`.
    pub fn keyword_pool(mut self, size: usize, query: impl Into<String>) -> Self {
        self.config.keyword_pool_size = Some(size);
        self.config.keyword_pool_query = query.into();
        self
    }

    pub fn retrieval(mut self, strategy: RetrievalStrategy) -> Self {
        self.config.retrieval = strategy;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    pub fn service_timeout_secs(mut self, secs: u64) -> Self {
        self.config.service_timeout_secs = secs;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.embedding_batch_size, 5);
        assert_eq!(config.retrieval, RetrievalStrategy::Fused { dense_weight: 0.7, sparse_weight: 0.3 });
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn zero_weights_are_rejected() {
        let result = RagConfig::builder()
            .retrieval(RetrievalStrategy::Fused { dense_weight: 0.0, sparse_weight: 0.0 })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"chunk_overlap": 20, "retrieval": {"kind": "dense_only"}}"#)
                .unwrap();
        assert_eq!(config.chunk_overlap, 20);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.retrieval, RetrievalStrategy::DenseOnly);
    }
}
