//! Fixed-pipeline answer synthesis.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use koi_model::{Llm, LlmRequest, Message};
use koi_rag::SearchResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::AgentStep;
use crate::config::AnswerMode;
use crate::error::{ChatError, Result, with_timeout};
use crate::history::ConversationHistory;
use crate::prompt::PromptTemplates;

/// Join retrieved chunk texts with a blank line, in retrieval order.
pub fn format_context(results: &[SearchResult]) -> String {
    results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n")
}

/// The outcome of one successful turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub mode: AnswerMode,
    /// The condensed question used for retrieval (fixed pipeline only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standalone_question: Option<String>,
    /// Tool calls made on the way (agentic mode only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<AgentStep>,
    /// Distinct source files of the context the answer was built from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

pub(crate) fn distinct_sources(results: &[SearchResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for result in results {
        if let Some(source) = result.chunk.metadata.get("source") {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }
    }
    sources
}

/// One completion over the answer prompt: system prompt with the context,
/// the full history, then the question.
pub struct AnswerSynthesizer {
    llm: Arc<dyn Llm>,
    templates: Arc<PromptTemplates>,
    temperature: Option<f32>,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(
        llm: Arc<dyn Llm>,
        templates: Arc<PromptTemplates>,
        temperature: Option<f32>,
        timeout: Duration,
    ) -> Self {
        Self { llm, templates, temperature, timeout }
    }

    pub fn messages(
        &self,
        question: &str,
        context: &str,
        history: &ConversationHistory,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.templates.render_answer_system(context)));
        messages.extend(history.to_messages());
        messages.push(Message::human(question));
        messages
    }

    fn request(&self, question: &str, context: &str, history: &ConversationHistory) -> LlmRequest {
        LlmRequest::new(self.messages(question, context, history)).with_temperature(self.temperature)
    }

    pub async fn synthesize(
        &self,
        question: &str,
        context: &str,
        history: &ConversationHistory,
    ) -> Result<String> {
        let request = self.request(question, context, history);
        debug!(context_chars = context.len(), messages = request.messages.len(), "synthesizing answer");
        let response =
            with_timeout("answer synthesis", self.timeout, self.llm.complete(request)).await?;
        Ok(response.content)
    }

    /// Like [`synthesize`](Self::synthesize), handing each text delta to
    /// `on_delta` as it arrives. Returns the full answer once the stream ends.
    pub async fn synthesize_streaming<F>(
        &self,
        question: &str,
        context: &str,
        history: &ConversationHistory,
        mut on_delta: F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let request = self.request(question, context, history);
        let mut stream =
            with_timeout("answer synthesis", self.timeout, self.llm.complete_stream(request))
                .await?;

        let mut answer = String::new();
        loop {
            let next = tokio::time::timeout(self.timeout, stream.next()).await.map_err(|_| {
                ChatError::Timeout { operation: "answer stream".to_string(), limit: self.timeout }
            })?;
            match next {
                Some(delta) => {
                    let delta = delta?;
                    on_delta(&delta);
                    answer.push_str(&delta);
                }
                None => break,
            }
        }
        Ok(answer)
    }
}
