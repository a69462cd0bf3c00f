//! The agentic answering loop.
//!
//! Each step sends the system prompt, the history, the question and the
//! scratchpad of earlier tool calls to the model. A reply without tool calls
//! is the answer. Tool calls are executed in order; a return-direct tool ends
//! the turn with its output, any other tool's output goes back to the model.

use std::sync::Arc;
use std::time::Duration;

use koi_model::{Llm, LlmRequest, Message, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result, with_timeout};
use crate::history::ConversationHistory;
use crate::prompt::PromptTemplates;
use crate::tool::{ToolOutput, ToolRegistry};

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub tool: String,
    pub arguments: Value,
    pub output: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// What the loop produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    pub answer: String,
    pub trace: Vec<AgentStep>,
    /// Distinct source files returned by the executed tools, first seen first.
    pub sources: Vec<String>,
}

impl AgentOutcome {
    fn new(answer: String, trace: Vec<AgentStep>) -> Self {
        let mut sources: Vec<String> = Vec::new();
        for source in trace.iter().flat_map(|step| &step.sources) {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }
        Self { answer, trace, sources }
    }
}

pub struct AgentLoop {
    llm: Arc<dyn Llm>,
    templates: Arc<PromptTemplates>,
    temperature: Option<f32>,
    timeout: Duration,
    max_steps: usize,
}

impl AgentLoop {
    pub fn new(
        llm: Arc<dyn Llm>,
        templates: Arc<PromptTemplates>,
        temperature: Option<f32>,
        timeout: Duration,
        max_steps: usize,
    ) -> Self {
        Self { llm, templates, temperature, timeout, max_steps }
    }

    /// Answer `question`, letting the model call tools from `tools`.
    ///
    /// # Errors
    ///
    /// Model and tool failures end the turn. Calls to unknown tools and
    /// malformed arguments are reported back to the model instead.
    /// [`ChatError::AgentStepLimit`] once `max_steps` model calls produced no answer.
    pub async fn run(
        &self,
        question: &str,
        history: &ConversationHistory,
        tools: &ToolRegistry,
    ) -> Result<AgentOutcome> {
        let mut base = Vec::with_capacity(history.len() + 2);
        base.push(Message::system(self.templates.render_agent_system(&tools.names())));
        base.extend(history.to_messages());
        base.push(Message::human(question));

        let specs = tools.specs();
        let mut scratchpad: Vec<Message> = Vec::new();
        let mut trace: Vec<AgentStep> = Vec::new();

        for step in 1..=self.max_steps {
            let messages: Vec<Message> = base.iter().chain(&scratchpad).cloned().collect();
            let request = LlmRequest::new(messages)
                .with_tools(specs.clone())
                .with_temperature(self.temperature);

            let response =
                with_timeout("agent step", self.timeout, self.llm.complete(request)).await?;

            if response.tool_calls.is_empty() {
                info!(steps = step, tool_calls = trace.len(), "agent answered");
                return Ok(AgentOutcome::new(response.content, trace));
            }

            debug!(step, calls = response.tool_calls.len(), "agent requested tools");
            scratchpad.push(Message::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let (ToolOutput { content, sources }, return_direct) =
                    self.execute(call, tools).await?;
                trace.push(AgentStep {
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                    output: content.clone(),
                    sources,
                });
                if return_direct {
                    info!(steps = step, tool = %call.name, "return-direct tool finished the turn");
                    return Ok(AgentOutcome::new(content, trace));
                }
                scratchpad.push(Message::tool_result(&call.name, content));
            }
        }

        warn!(max_steps = self.max_steps, "agent step limit reached");
        Err(ChatError::AgentStepLimit { max_steps: self.max_steps })
    }

    /// Run one call. Recoverable call mistakes become the tool output.
    async fn execute(&self, call: &ToolCall, tools: &ToolRegistry) -> Result<(ToolOutput, bool)> {
        let Some(tool) = tools.get(&call.name) else {
            let err = ChatError::UnknownTool { name: call.name.clone() };
            warn!(error = %err, "model called an unknown tool");
            return Ok((format!("Error: {err}").into(), false));
        };

        match tool.execute(call.arguments.clone()).await {
            Ok(output) => Ok((output, tool.return_direct())),
            Err(err @ ChatError::InvalidToolArguments { .. }) => {
                warn!(error = %err, "model sent invalid tool arguments");
                Ok((format!("Error: {err}").into(), false))
            }
            Err(err) => Err(err),
        }
    }
}
