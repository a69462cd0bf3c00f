//! Error types for the `koi-chat` crate.

use std::future::Future;
use std::time::Duration;

use koi_model::ModelError;
use koi_rag::RagError;
use thiserror::Error;

/// Errors that end a conversational turn.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Ingestion or retrieval failed.
    #[error(transparent)]
    Rag(#[from] RagError),

    /// The language model call failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A language model call exceeded its time budget.
    #[error("{operation} timed out after {limit:?}")]
    Timeout { operation: String, limit: Duration },

    /// The agent kept calling tools without producing an answer.
    #[error("agent did not finish within {max_steps} steps")]
    AgentStepLimit { max_steps: usize },

    /// The model asked for a tool that is not registered.
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },

    /// The model called a tool with arguments it cannot use.
    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidToolArguments { tool: String, message: String },

    /// Invalid chat configuration or prompt templates.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ChatError {
    /// A sentence suitable for showing to the person chatting.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rag(RagError::EmptyIndexError) => {
                "No documents have been loaded yet. Upload a .txt, .docx or .pdf file first."
                    .to_string()
            }
            Self::Rag(RagError::EmbeddingServiceError { message, .. }) => {
                format!("The embedding service failed ({message}). Please try again.")
            }
            Self::Rag(RagError::RetrievalTimeoutError { operation, limit }) => {
                format!(
                    "The {operation} took longer than {} seconds. Please try again.",
                    limit.as_secs()
                )
            }
            Self::Timeout { limit, .. } => format!(
                "The language model did not answer within {} seconds. Please try again.",
                limit.as_secs()
            ),
            Self::Rag(RagError::UnsupportedFormatError { name, .. }) => {
                format!("'{name}' is not a supported file. Use .txt, .docx or .pdf.")
            }
            Self::Rag(other) => format!("Something went wrong with the documents: {other}"),
            Self::Model(ModelError::CompletionServiceError { message, .. }) => {
                format!("The language model could not answer ({message}). Please try again.")
            }
            Self::Model(other) => format!("The language model is not set up correctly: {other}"),
            Self::AgentStepLimit { max_steps } => format!(
                "I could not finish answering within {max_steps} steps. Try rephrasing the question."
            ),
            Self::UnknownTool { .. } | Self::InvalidToolArguments { .. } => {
                format!("The assistant made an invalid tool call: {self}")
            }
            Self::ConfigError(message) => format!("Invalid configuration: {message}"),
        }
    }
}

/// A convenience result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Run a model call, failing with [`ChatError::Timeout`] once `limit` elapses.
pub(crate) async fn with_timeout<T, E>(
    operation: &str,
    limit: Duration,
    future: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    ChatError: From<E>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(ChatError::from),
        Err(_) => Err(ChatError::Timeout { operation: operation.to_string(), limit }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_has_a_friendly_message() {
        let message = ChatError::from(RagError::EmptyIndexError).user_message();
        assert!(message.contains("No documents"));
    }

    #[test]
    fn timeouts_report_seconds() {
        let err = ChatError::Timeout { operation: "answer".into(), limit: Duration::from_secs(60) };
        assert!(err.user_message().contains("60 seconds"));
    }
}
