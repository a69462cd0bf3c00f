//! # koi-model
//!
//! The language-model boundary of the Koi document assistant.
//!
//! The core treats the model as an opaque completion function: an ordered list
//! of [`Message`]s plus optional [`ToolSpec`]s goes in, text and/or
//! [`ToolCall`]s come out. Implementations:
//!
//! - [`GeminiModel`] - Google's Gemini models (`gemini` feature, on by default)
//! - [`MockLlm`] - scripted responses for tests and offline runs

pub mod error;
#[cfg(feature = "gemini")]
pub mod gemini;
pub mod llm;
pub mod mock;

pub use error::{ModelError, Result};
#[cfg(feature = "gemini")]
pub use gemini::GeminiModel;
pub use llm::{Llm, LlmRequest, LlmResponse, Message, Role, TextStream, ToolCall, ToolSpec};
pub use mock::MockLlm;
