//! Conversational question answering over a Koi knowledge base.
//!
//! A [`Session`] ties together the ingestion pipeline from `koi-rag`, a
//! language model from `koi-model`, and the conversation history. Each turn
//! is answered in one of two [`AnswerMode`]s:
//!
//! - **Fixed pipeline**: the [`QuestionCondenser`] rewrites the question
//!   using the history, the knowledge base retrieves context for it, and the
//!   [`AnswerSynthesizer`] makes one completion over that context.
//! - **Agentic**: an [`AgentLoop`] lets the model call [`RetrievalTool`]
//!   (and any extra [`Tool`]s) until it has an answer.
//!
//! Failed turns never reach the history.

pub mod agent;
pub mod condenser;
pub mod config;
pub mod error;
pub mod history;
pub mod prompt;
pub mod session;
pub mod synthesizer;
pub mod tool;

pub use agent::{AgentLoop, AgentOutcome, AgentStep};
pub use condenser::QuestionCondenser;
pub use config::{AnswerMode, ChatConfig, ChatConfigBuilder, DEFAULT_GREETING};
pub use error::{ChatError, Result};
pub use history::{ConversationHistory, Turn, TurnRole};
pub use prompt::{PromptTemplates, render};
pub use session::{FileOutcome, IngestReport, Session, SessionBuilder};
pub use synthesizer::{Answer, AnswerSynthesizer, format_context};
pub use tool::{RetrievalTool, Tool, ToolOutput, ToolRegistry};
