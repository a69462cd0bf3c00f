//! Prompt templates and placeholder rendering.
//!
//! Templates are plain data: they can be loaded from JSON and versioned
//! independently of the code. Placeholders are written `{name}`.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid"));

/// Substitute `{name}` placeholders from `bindings` in a single pass.
///
/// Unknown placeholders are left as written, and substituted values are not
/// scanned again, so braces inside document text survive untouched.
pub fn render(template: &str, bindings: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            bindings
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// All prompt text used by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub version: u32,
    /// System instruction for rewriting follow-up questions.
    pub condense_system: String,
    /// System prompt of the fixed pipeline. Placeholders: `{context}`, `{not_found}`.
    pub answer_system: String,
    /// System prompt of the agent. Placeholders: `{tool_names}`, `{not_found}`.
    pub agent_system: String,
    /// The exact reply when the documents do not contain the answer.
    pub not_found: String,
    pub retrieval_tool_description: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            version: 1,
            condense_system: "Given a chat history and a follow-up question, rephrase the \
                follow-up question to be a standalone question, in its original language."
                .to_string(),
            answer_system: "You are a helpful AI assistant that answers questions based on the \
                provided documents.\n\
                Answer the user's question in a detailed and clear way.\n\
                Only use the chat history and the following context to give the most complete answer.\n\
                Base your answer on the context and the chat history.\n\
                If the answer cannot be found in the context, reply exactly: \"{not_found}\"\n\n\
                Context:\n{context}"
                .to_string(),
            agent_system: "You are a helpful AI assistant that answers questions based on the \
                provided documents.\n\
                Your name is Koi.\n\
                Answer the user's question in a detailed and clear way, based on the information \
                provided.\n\
                If there is not enough information, reply exactly: \"{not_found}\"\n\n\
                You have access to the following tools: {tool_names}. Use them if needed."
                .to_string(),
            not_found: "I could not find this information in the documents.".to_string(),
            retrieval_tool_description:
                "Search for information about a question in the knowledge base.".to_string(),
        }
    }
}

impl PromptTemplates {
    /// Load templates from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ChatError::ConfigError(format!("cannot read prompt file {}: {e}", path.display()))
        })?;
        let templates: Self = serde_json::from_str(&text).map_err(|e| {
            ChatError::ConfigError(format!("invalid prompt file {}: {e}", path.display()))
        })?;
        templates.validate()?;
        Ok(templates)
    }

    /// Templates must keep the placeholders the pipeline fills in.
    pub fn validate(&self) -> Result<()> {
        if !self.answer_system.contains("{context}") {
            return Err(ChatError::ConfigError(
                "answer_system must contain a {context} placeholder".to_string(),
            ));
        }
        if self.not_found.trim().is_empty() {
            return Err(ChatError::ConfigError("not_found must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn render_answer_system(&self, context: &str) -> String {
        render(&self.answer_system, &[("context", context), ("not_found", &self.not_found)])
    }

    pub fn render_agent_system(&self, tool_names: &[&str]) -> String {
        let names = tool_names.join(", ");
        render(&self.agent_system, &[("tool_names", &names), ("not_found", &self.not_found)])
    }
}
