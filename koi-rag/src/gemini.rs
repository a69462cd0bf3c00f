//! Gemini embedding provider using the `koi-gemini` crate.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use tracing::{debug, error};

use koi_gemini::{
    BatchEmbedContentsRequest, Content, EmbedContentRequest, Gemini, Model, TaskType,
};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "Gemini";

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Batches go through `batchEmbedContents`, one HTTP call per batch. The same
/// task type is used for documents and queries so that both sides of a
/// similarity comparison come from one embedding function.
///
/// ```rust,ignore
/// use koi_rag::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::new(&api_key)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: Gemini,
    task_type: TaskType,
    output_dimensionality: Option<i32>,
}

impl GeminiEmbeddingProvider {
    /// Default embedding dimensions for `gemini-embedding-001`.
    const DEFAULT_DIMENSIONS: usize = 3072;

    /// Create a provider for the default `gemini-embedding-001` model.
    pub fn new(api_key: impl AsRef<str>) -> Result<Self> {
        Self::with_model(api_key, Model::GeminiEmbedding001)
    }

    /// Create a provider for a specific embedding model, e.g. `models/gemini-embedding-001`.
    pub fn with_model(api_key: impl AsRef<str>, model: impl Into<Model>) -> Result<Self> {
        let client = Gemini::with_model(api_key, model).map_err(|e| {
            RagError::EmbeddingServiceError {
                provider: PROVIDER.into(),
                message: format!("failed to create Gemini client: {e}"),
            }
        })?;
        Ok(Self::from_client(client))
    }

    /// Create a provider from an existing [`Gemini`] client.
    pub fn from_client(client: Gemini) -> Self {
        Self {
            client,
            task_type: TaskType::RetrievalDocument,
            output_dimensionality: None,
        }
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Set the output dimensionality (truncates the embedding vector).
    pub fn with_output_dimensionality(mut self, dims: i32) -> Self {
        self.output_dimensionality = Some(dims);
        self
    }

    fn request(&self, text: &str) -> EmbedContentRequest {
        EmbedContentRequest {
            model: Some(self.client.model().to_string()),
            content: Content::text(text),
            task_type: Some(self.task_type.clone()),
            output_dimensionality: self.output_dimensionality,
        }
    }
}

fn service_error(e: koi_gemini::Error) -> RagError {
    error!(provider = PROVIDER, error = %e, "embedding request failed");
    RagError::EmbeddingServiceError { provider: PROVIDER.into(), message: e.to_string() }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");
        let response = self.client.embed_content(&self.request(text)).await.map_err(service_error)?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let request =
            BatchEmbedContentsRequest { requests: texts.iter().map(|t| self.request(t)).collect() };
        let response =
            self.client.batch_embed_contents(&request).await.map_err(service_error)?;

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    /// Known for `gemini-embedding-001` and for an explicit output
    /// dimensionality; other models are not assumed to share a size.
    fn dimensions(&self) -> Option<usize> {
        match (self.output_dimensionality, self.client.model()) {
            (Some(dims), _) => usize::try_from(dims).ok(),
            (None, Model::GeminiEmbedding001) => Some(Self::DEFAULT_DIMENSIONS),
            (None, _) => None,
        }
    }
}
