//! Rewrites follow-up questions into standalone ones.

use std::sync::Arc;
use std::time::Duration;

use koi_model::{Llm, LlmRequest, Message};
use tracing::debug;

use crate::error::{Result, with_timeout};
use crate::history::ConversationHistory;
use crate::prompt::PromptTemplates;

/// Asks the model to resolve pronouns and ellipsis in a question using the
/// conversation so far. The model is always called, even with no history.
pub struct QuestionCondenser {
    llm: Arc<dyn Llm>,
    templates: Arc<PromptTemplates>,
    temperature: Option<f32>,
    timeout: Duration,
}

impl QuestionCondenser {
    pub fn new(
        llm: Arc<dyn Llm>,
        templates: Arc<PromptTemplates>,
        temperature: Option<f32>,
        timeout: Duration,
    ) -> Self {
        Self { llm, templates, temperature, timeout }
    }

    /// The prompt: instruction, full history, then the new question.
    pub fn messages(&self, question: &str, history: &ConversationHistory) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&self.templates.condense_system));
        messages.extend(history.to_messages());
        messages.push(Message::human(question));
        messages
    }

    /// Return the model's standalone question verbatim.
    pub async fn condense(&self, question: &str, history: &ConversationHistory) -> Result<String> {
        let request = LlmRequest::new(self.messages(question, history))
            .with_temperature(self.temperature);
        let response =
            with_timeout("question condensing", self.timeout, self.llm.complete(request)).await?;
        debug!(question, standalone = %response.content, "condensed question");
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koi_model::{MockLlm, Role};

    fn condenser(llm: &MockLlm) -> QuestionCondenser {
        QuestionCondenser::new(
            Arc::new(llm.clone()),
            Arc::new(PromptTemplates::default()),
            Some(0.1),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn calls_the_model_even_without_history() {
        let llm = MockLlm::new().with_text("What is the refund policy?");
        let standalone = condenser(&llm)
            .condense("What is the refund policy?", &ConversationHistory::new())
            .await
            .unwrap();

        assert_eq!(standalone, "What is the refund policy?");
        assert_eq!(llm.call_count(), 1);
        let request = &llm.requests()[0];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, Some(0.1));
    }

    #[tokio::test]
    async fn sends_history_between_instruction_and_question() {
        let llm = MockLlm::new().with_text("  How long does shipping take?\n");
        let mut history = ConversationHistory::new();
        history.record_exchange("What is shipping?", "Delivery of orders.");

        let standalone = condenser(&llm).condense("How long does it take?", &history).await.unwrap();
        assert_eq!(standalone, "  How long does shipping take?\n");

        let roles: Vec<Role> = llm.requests()[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::Human, Role::Assistant, Role::Human]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let llm = MockLlm::new().with_text("late").with_delay(Duration::from_secs(30));
        let err = condenser(&llm).condense("q", &ConversationHistory::new()).await.unwrap_err();
        assert!(matches!(err, crate::ChatError::Timeout { .. }));
    }
}
