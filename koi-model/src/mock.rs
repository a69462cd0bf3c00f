//! A scripted [`Llm`] for tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ModelError, Result};
use crate::llm::{Llm, LlmRequest, LlmResponse, TextStream};

type Responder = dyn Fn(&LlmRequest) -> Result<LlmResponse> + Send + Sync;

enum Scripted {
    Response(LlmResponse),
    Failure(String),
}

/// Mock language model that replays scripted responses in order.
///
/// When the script is exhausted the optional responder is consulted; without
/// one, the call fails with a completion error. Every request is recorded so
/// tests can inspect prompts after the fact.
///
/// ```rust
/// use koi_model::{LlmResponse, MockLlm};
///
/// let llm = MockLlm::new()
///     .with_text("What is the refund policy?")
///     .with_response(LlmResponse::text("Refunds take 14 days."));
/// ```
#[derive(Clone, Default)]
pub struct MockLlm {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
    responder: Option<Arc<Responder>>,
    delay: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: LlmResponse) -> Self {
        lock(&self.script).push_back(Scripted::Response(response));
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_response(LlmResponse::text(text))
    }

    /// Queue a failing call.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        lock(&self.script).push_back(Scripted::Failure(message.into()));
        self
    }

    /// Answer unscripted calls with `responder`.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<LlmResponse> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Sleep before answering, for exercising caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl Llm for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        lock(&self.requests).push(request.clone());
        let next = lock(&self.script).pop_front();
        match next {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Failure(message)) => Err(ModelError::completion("mock", message)),
            None => match &self.responder {
                Some(responder) => responder(&request),
                None => Err(ModelError::completion("mock", "no scripted response left")),
            },
        }
    }

    /// Streams the scripted text word by word.
    async fn complete_stream(&self, request: LlmRequest) -> Result<TextStream> {
        let response = self.complete(request).await?;
        let pieces: Vec<Result<String>> = response
            .content
            .split_inclusive(' ')
            .map(|piece| Ok(piece.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(pieces)))
    }
}
