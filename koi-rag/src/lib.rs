//! Document ingestion and hybrid retrieval for the Koi document assistant.
//!
//! The crate turns uploaded files into a [`KnowledgeBase`]:
//!
//! - [`DocumentLoader`] extracts text from `.txt`, `.docx` and `.pdf` blobs,
//!   skipping files it cannot read instead of failing the batch
//! - [`RecursiveChunker`] cuts text into bounded, exactly-overlapping chunks
//! - [`DenseIndex`] embeds chunks through an [`EmbeddingProvider`]
//! - [`KeywordIndex`] scores chunks with BM25 (tantivy)
//! - [`HybridRetriever`] fuses both rankings per [`RetrievalStrategy`]
//!
//! # Features
//!
//! - `gemini` (default): [`GeminiEmbeddingProvider`]
//! - `pdf` (default): PDF text extraction via `pdf-extract`

pub mod chunking;
pub mod config;
pub mod dense;
pub mod document;
pub mod embedding;
pub mod error;
#[cfg(feature = "gemini")]
pub mod gemini;
pub mod hybrid;
pub mod keyword;
pub mod loader;
pub mod pipeline;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use dense::{DenseEntry, DenseIndex, EmbedOptions};
pub use document::{Chunk, Document, DocumentFormat, SearchResult};
pub use embedding::{EmbeddingProvider, cosine_similarity};
pub use error::{RagError, Result};
#[cfg(feature = "gemini")]
pub use gemini::GeminiEmbeddingProvider;
pub use hybrid::{HybridRetriever, RetrievalStrategy, fuse};
pub use keyword::KeywordIndex;
pub use loader::{DocumentLoader, FileBlob, LoadFailure, LoadReport};
pub use pipeline::{KnowledgeBase, RagPipeline, RagPipelineBuilder};
