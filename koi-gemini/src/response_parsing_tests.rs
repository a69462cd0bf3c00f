//! Response parsing tests against JSON shapes returned by the Gemini API.

use crate::{
    BatchContentEmbeddingResponse, Content, EmbedContentRequest, FinishReason,
    GenerateContentRequest, GenerationResponse, Part, Role, TaskType, Tool, FunctionDeclaration,
};
use serde_json::json;

// ── Basic text response ─────────────────────────────────────────────

#[test]
fn parse_simple_text_response() {
    let json = json!({
        "candidates": [{
            "content": {
                "parts": [{"text": "Hello, world!"}],
                "role": "model"
            },
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {
            "promptTokenCount": 5,
            "candidatesTokenCount": 4,
            "totalTokenCount": 9
        },
        "modelVersion": "gemini-2.5-flash",
        "responseId": "abc123"
    });

    let resp: GenerationResponse = serde_json::from_value(json).unwrap();
    assert_eq!(resp.text(), "Hello, world!");
    assert_eq!(resp.candidates[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(resp.model_version.as_deref(), Some("gemini-2.5-flash"));

    let usage = resp.usage_metadata.as_ref().unwrap();
    assert_eq!(usage.total_token_count, Some(9));
    assert_eq!(usage.thoughts_token_count, None);
}

// ── Thought parts are not part of the answer text ───────────────────

#[test]
fn text_skips_thought_parts() {
    let json = json!({
        "candidates": [{
            "content": {
                "parts": [
                    {"text": "Let me think...", "thought": true},
                    {"text": "The answer "},
                    {"text": "is 42."}
                ],
                "role": "model"
            }
        }]
    });

    let resp: GenerationResponse = serde_json::from_value(json).unwrap();
    assert_eq!(resp.text(), "The answer is 42.");
}

// ── Function calls ──────────────────────────────────────────────────

#[test]
fn parse_function_call_response() {
    let json = json!({
        "candidates": [{
            "content": {
                "parts": [{
                    "functionCall": {
                        "name": "search_documents",
                        "args": {"query": "refund policy"}
                    }
                }],
                "role": "model"
            },
            "finishReason": "STOP"
        }]
    });

    let resp: GenerationResponse = serde_json::from_value(json).unwrap();
    let calls = resp.function_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "search_documents");
    assert_eq!(calls[0].args["query"], "refund policy");
    assert_eq!(resp.text(), "");
}

// ── Blocked prompt / unknown finish reason ──────────────────────────

#[test]
fn parse_blocked_prompt_without_candidates() {
    let json = json!({
        "promptFeedback": {"blockReason": "SAFETY"}
    });

    let resp: GenerationResponse = serde_json::from_value(json).unwrap();
    assert!(resp.candidates.is_empty());
    assert_eq!(resp.text(), "");
    assert_eq!(resp.prompt_feedback.unwrap().block_reason.as_deref(), Some("SAFETY"));
}

#[test]
fn unknown_finish_reason_maps_to_other() {
    let json = json!({
        "candidates": [{
            "content": {"parts": [{"text": "x"}], "role": "model"},
            "finishReason": "SOMETHING_NEW"
        }]
    });

    let resp: GenerationResponse = serde_json::from_value(json).unwrap();
    assert_eq!(resp.candidates[0].finish_reason, Some(FinishReason::Other));
}

// ── Streaming chunk (no usage, partial text) ────────────────────────

#[test]
fn parse_streaming_chunk() {
    let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}],"role":"model"},"index":0}]}"#;
    let resp: GenerationResponse = serde_json::from_str(data).unwrap();
    assert_eq!(resp.text(), "Hel");
    assert!(resp.usage_metadata.is_none());
}

// ── Embeddings ──────────────────────────────────────────────────────

#[test]
fn parse_batch_embedding_response() {
    let json = json!({
        "embeddings": [
            {"values": [0.1, 0.2, 0.3]},
            {"values": [0.4, 0.5, 0.6]}
        ]
    });

    let resp: BatchContentEmbeddingResponse = serde_json::from_value(json).unwrap();
    assert_eq!(resp.embeddings.len(), 2);
    assert_eq!(resp.embeddings[1].values, vec![0.4, 0.5, 0.6]);
}

// ── Request serialization ───────────────────────────────────────────

#[test]
fn generate_request_uses_camel_case_and_omits_empty_fields() {
    let request = GenerateContentRequest {
        contents: vec![Content::new(Role::User, vec![Part::text("hi")])],
        system_instruction: Some(Content::text("be brief")),
        tools: Some(vec![Tool {
            function_declarations: vec![FunctionDeclaration {
                name: "search_documents".into(),
                description: "Search".into(),
                parameters: None,
            }],
        }]),
        generation_config: None,
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["contents"][0]["role"], "user");
    assert_eq!(value["contents"][0]["parts"][0], json!({"text": "hi"}));
    assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
    assert!(value["systemInstruction"].get("role").is_none());
    assert_eq!(value["tools"][0]["functionDeclarations"][0]["name"], "search_documents");
    assert!(value.get("generationConfig").is_none());
}

#[test]
fn embed_request_serializes_task_type() {
    let request = EmbedContentRequest {
        model: Some("models/gemini-embedding-001".into()),
        content: Content::text("chunk text"),
        task_type: Some(TaskType::RetrievalDocument),
        output_dimensionality: None,
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["taskType"], "RETRIEVAL_DOCUMENT");
    assert_eq!(value["model"], "models/gemini-embedding-001");
    assert!(value.get("outputDimensionality").is_none());
}
