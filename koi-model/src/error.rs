//! Error types for the `koi-model` crate.

use thiserror::Error;

/// Errors raised at the language-model boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The completion service call failed or returned an unusable response.
    #[error("Completion service error ({provider}): {message}")]
    CompletionServiceError {
        /// The model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ModelError {
    pub(crate) fn completion(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CompletionServiceError { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
