//! Error types for the `koi-rag` crate.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in ingestion and retrieval.
#[derive(Debug, Error)]
pub enum RagError {
    /// The file type is not one the loader understands.
    #[error("Unsupported format for '{name}': {reason}")]
    UnsupportedFormatError {
        /// Name of the rejected file.
        name: String,
        /// Why the format was rejected.
        reason: String,
    },

    /// The file has a supported type but its contents could not be parsed.
    #[error("Failed to load '{name}': {message}")]
    LoadError {
        /// Name of the file that failed.
        name: String,
        /// A description of the failure.
        message: String,
    },

    /// The external embedding call failed.
    #[error("Embedding service error ({provider}): {message}")]
    EmbeddingServiceError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Retrieval was attempted before any document was indexed.
    #[error("No documents have been indexed yet")]
    EmptyIndexError,

    /// An external call exceeded its time budget.
    #[error("{operation} timed out after {limit:?}")]
    RetrievalTimeoutError {
        /// The operation that was cut off.
        operation: String,
        /// The configured limit.
        limit: Duration,
    },

    /// The keyword (BM25) index could not be built or queried.
    #[error("Keyword index error: {0}")]
    KeywordIndexError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Saving or restoring an index failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Run `future`, failing with [`RagError::RetrievalTimeoutError`] once `limit` elapses.
pub async fn with_timeout<T>(
    operation: &str,
    limit: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(RagError::RetrievalTimeoutError { operation: operation.to_string(), limit }),
    }
}
