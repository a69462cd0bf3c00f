//! Gemini-backed [`Llm`] implementation.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use futures::StreamExt;
use koi_gemini::{
    Content, FunctionDeclaration, Gemini, GenerateContentRequest, GenerationConfig,
    GenerationResponse, Model, Part, Role as GeminiRole, Tool,
};
use serde_json::json;
use tracing::{debug, error};

use crate::error::{ModelError, Result};
use crate::llm::{Llm, LlmRequest, LlmResponse, Message, Role, TextStream, ToolCall};

const PROVIDER: &str = "Gemini";

/// A chat model served by the Gemini API.
///
/// ```rust,ignore
/// use koi_model::GeminiModel;
///
/// let model = GeminiModel::new(&api_key, "gemini-2.5-flash")?;
/// ```
pub struct GeminiModel {
    client: Gemini,
    name: String,
}

impl GeminiModel {
    pub fn new(api_key: impl AsRef<str>, model: impl AsRef<str>) -> Result<Self> {
        let model = Model::from(model.as_ref());
        let client = Gemini::with_model(api_key, model).map_err(|e| {
            ModelError::ConfigError(format!("failed to create Gemini client: {e}"))
        })?;
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client, e.g. one with a custom base URL or HTTP settings.
    pub fn from_client(client: Gemini) -> Self {
        let name = client.model().as_str().trim_start_matches("models/").to_string();
        Self { client, name }
    }
}

/// Convert the provider-neutral request into a Gemini request.
///
/// System messages are folded into `systemInstruction`; consecutive messages
/// that map to the same Gemini role are merged into one content block.
pub(crate) fn to_gemini_request(request: &LlmRequest) -> GenerateContentRequest {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut contents: Vec<Content> = Vec::new();
    for message in request.messages.iter().filter(|m| m.role != Role::System) {
        let (role, parts) = message_parts(message);
        if parts.is_empty() {
            continue;
        }
        match contents.last_mut() {
            Some(last) if last.role == Some(role) => last.parts.extend(parts),
            _ => contents.push(Content::new(role, parts)),
        }
    }

    let tools = (!request.tools.is_empty()).then(|| {
        vec![Tool {
            function_declarations: request
                .tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: Some(t.parameters.clone()),
                })
                .collect(),
        }]
    });

    GenerateContentRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| Content::text(system.join("\n\n"))),
        tools,
        generation_config: request
            .temperature
            .map(|temperature| GenerationConfig { temperature: Some(temperature), ..Default::default() }),
    }
}

fn message_parts(message: &Message) -> (GeminiRole, Vec<Part>) {
    match message.role {
        Role::Human | Role::System => (GeminiRole::User, vec![Part::text(&message.content)]),
        Role::Assistant => {
            let mut parts = Vec::new();
            if !message.content.is_empty() {
                parts.push(Part::text(&message.content));
            }
            parts.extend(
                message.tool_calls.iter().map(|c| Part::function_call(&c.name, c.arguments.clone())),
            );
            (GeminiRole::Model, parts)
        }
        Role::Tool => {
            let name = message.tool_name.clone().unwrap_or_default();
            (
                GeminiRole::User,
                vec![Part::function_response(name, json!({ "content": message.content }))],
            )
        }
    }
}

pub(crate) fn from_gemini_response(response: &GenerationResponse) -> Result<LlmResponse> {
    if response.candidates.is_empty() {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(ModelError::completion(PROVIDER, format!("response blocked: {reason}")));
    }

    let tool_calls = response
        .function_calls()
        .into_iter()
        .enumerate()
        .map(|(i, call)| ToolCall {
            id: format!("call_{}_{i}", call.name),
            name: call.name.clone(),
            arguments: call.args.clone(),
        })
        .collect();

    Ok(LlmResponse { content: response.text(), tool_calls })
}

#[async_trait]
impl Llm for GeminiModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let gemini_request = to_gemini_request(&request);
        debug!(
            provider = PROVIDER,
            model = %self.name,
            messages = gemini_request.contents.len(),
            tools = request.tools.len(),
            "sending completion request"
        );

        let response = self.client.generate_content(&gemini_request).await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "completion request failed");
            ModelError::completion(PROVIDER, e.to_string())
        })?;

        from_gemini_response(&response)
    }

    async fn complete_stream(&self, request: LlmRequest) -> Result<TextStream> {
        let gemini_request = to_gemini_request(&request);
        debug!(provider = PROVIDER, model = %self.name, "starting streamed completion");

        let stream =
            self.client.stream_generate_content(&gemini_request).await.map_err(|e| {
                error!(provider = PROVIDER, error = %e, "streaming request failed");
                ModelError::completion(PROVIDER, e.to_string())
            })?;

        let text = stream.filter_map(|chunk| async move {
            match chunk {
                Ok(response) => {
                    let text = response.text();
                    (!text.is_empty()).then_some(Ok(text))
                }
                Err(e) => Some(Err(ModelError::completion(PROVIDER, e.to_string()))),
            }
        });

        Ok(Box::pin(text))
    }
}
