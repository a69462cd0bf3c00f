//! Tools the agent can call, and the retrieval tool.
//!
//! The model names a tool at runtime; the call is matched against a
//! [`ToolRegistry`] built before the turn starts.
//!
//! ```rust,ignore
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(RetrievalTool::new(knowledge, "Not in the docs.")))?;
//!
//! // The agent calls the tool with:
//! // { "query": "How do I request a refund?" }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use koi_model::ToolSpec;
use koi_rag::KnowledgeBase;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::error::{ChatError, Result};
use crate::synthesizer::{distinct_sources, format_context};

/// What a tool returned: the text the model (or the user) sees and the
/// document files that text was drawn from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub sources: Vec<String>,
}

impl ToolOutput {
    pub fn with_sources(content: impl Into<String>, sources: Vec<String>) -> Self {
        Self { content: content.into(), sources }
    }
}

impl From<String> for ToolOutput {
    fn from(content: String) -> Self {
        Self { content, sources: Vec::new() }
    }
}

/// A callable exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Option<Value> {
        None
    }

    /// When true, the tool output is the final answer of the turn and the
    /// model does not see it again.
    fn return_direct(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self
                .parameters_schema()
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
        }
    }
}

/// Name-to-handler table, in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(ChatError::ConfigError(format!("tool '{name}' is already registered")));
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Hybrid search over the session's knowledge base.
///
/// Returns the retrieved chunk texts joined by blank lines along with their
/// source files, or the not-found message when nothing matches.
/// Return-direct by default.
pub struct RetrievalTool {
    knowledge: KnowledgeBase,
    description: String,
    not_found: String,
    return_direct: bool,
}

impl RetrievalTool {
    pub const NAME: &'static str = "search_documents";

    pub fn new(knowledge: KnowledgeBase, not_found: impl Into<String>) -> Self {
        Self {
            knowledge,
            description: "Search for information about a question in the knowledge base."
                .to_string(),
            not_found: not_found.into(),
            return_direct: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Feed results back to the model instead of ending the turn.
    pub fn with_return_direct(mut self, return_direct: bool) -> Self {
        self.return_direct = return_direct;
        self
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A standalone search query for the documents"
                }
            },
            "required": ["query"]
        }))
    }

    fn return_direct(&self) -> bool {
        self.return_direct
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ChatError::InvalidToolArguments {
                tool: Self::NAME.to_string(),
                message: "missing required 'query' parameter".to_string(),
            })?;

        info!(query, "retrieval tool called");

        let results = self.knowledge.retrieve(query).await.map_err(|e| {
            error!(error = %e, "retrieval tool failed");
            ChatError::from(e)
        })?;

        if results.is_empty() {
            return Ok(self.not_found.clone().into());
        }
        Ok(ToolOutput::with_sources(format_context(&results), distinct_sources(&results)))
    }
}
