//! OpenAI Responses backend
//!
//! The Responses API returns an ordered list of output items. Reasoning models
//! emit `reasoning` items next to their `function_call` items and reject the
//! follow-up request unless every item comes back unchanged, ids included.
//! Items this module does not understand are carried as [`Content::Opaque`],
//! and the full output list is kept in [`AssistantMetadata::raw_output`] so an
//! assistant turn is replayed exactly as it was received.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    backend::ModelBackend,
    error::{Error, Result},
    types::{
        AssistantMetadata, BackendKind, Content, Message, ModelRequest, ModelResponse,
        StopReason, Usage, tool_output_text,
    },
};

/// Responses API client
pub struct ResponsesBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ResponsesBackend {
    /// Create a backend for `base_url` (e.g. `https://api.openai.com/v1`)
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn build_request(&self, request: &ModelRequest) -> ResponsesRequest {
        let mut input = Vec::new();
        for msg in &request.messages {
            input.extend(convert_message(msg));
        }

        let tools = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                    "strict": false,
                })
            })
            .collect::<Vec<_>>();

        ResponsesRequest {
            model: request.model.clone(),
            instructions: request.system_prompt.clone(),
            input,
            tools: if tools.is_empty() { None } else { Some(tools) },
            temperature: request.sampling.temperature,
            max_output_tokens: request.sampling.max_tokens,
        }
    }
}

#[async_trait]
impl ModelBackend for ResponsesBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Responses
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = self.build_request(request);
        let url = format!("{}/responses", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &text));
        }

        let parsed: ResponsesResponse = serde_json::from_str(&text)?;
        parse_response(parsed, &request.model)
    }
}

/// Convert one conversation message into Responses input items.
fn convert_message(msg: &Message) -> Vec<Value> {
    match msg {
        Message::User { content, .. } => {
            let mut items = Vec::new();
            let text = msg.text();
            if !text.is_empty() {
                items.push(json!({ "role": "user", "content": text }));
            }
            // A user turn may carry raw items (e.g. images) supplied by the caller
            items.extend(content.iter().filter_map(|c| match c {
                Content::Opaque { payload } => Some(payload.clone()),
                _ => None,
            }));
            items
        }
        Message::Assistant { metadata, .. }
            if metadata.backend == Some(BackendKind::Responses)
                && !metadata.raw_output.is_empty() =>
        {
            metadata.raw_output.clone()
        }
        // Assistant turns from another backend, or built by hand
        Message::Assistant { content, .. } => content
            .iter()
            .map(|c| match c {
                Content::Text { text } => json!({
                    "type": "message",
                    "role": "assistant",
                    "content": [{ "type": "output_text", "text": text }],
                }),
                Content::ToolCall {
                    id,
                    name,
                    arguments,
                } => json!({
                    "type": "function_call",
                    "call_id": id,
                    "name": name,
                    "arguments": match arguments {
                        Value::String(raw) => raw.clone(),
                        other => other.to_string(),
                    },
                }),
                Content::Opaque { payload } => payload.clone(),
            })
            .collect(),
        Message::ToolResult {
            tool_call_id,
            output,
            error,
            ..
        } => vec![json!({
            "type": "function_call_output",
            "call_id": tool_call_id,
            "output": tool_output_text(output, error.as_deref()),
        })],
    }
}

fn parse_response(response: ResponsesResponse, model: &str) -> Result<ModelResponse> {
    if let Some(err) = response.error.filter(|e| !e.is_null()) {
        let error_type = err
            .get("code")
            .or_else(|| err.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("response_error");
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("response failed");
        return Err(Error::api(error_type, message));
    }

    let raw_output = response.output.clone();
    let mut content = Vec::with_capacity(response.output.len());
    for item in response.output {
        content.push(convert_output_item(item));
    }

    let stop_reason = if response.status.as_deref() == Some("incomplete") {
        StopReason::Length
    } else if content.iter().any(Content::is_tool_call) {
        StopReason::ToolUse
    } else {
        StopReason::Stop
    };

    let usage = response
        .usage
        .map(|u| Usage {
            input: u.input_tokens,
            output: u.output_tokens,
            reasoning: u
                .output_tokens_details
                .map(|d| d.reasoning_tokens)
                .unwrap_or(0),
        })
        .unwrap_or_default();

    let mut parsed = ModelResponse::new(content);
    parsed.metadata = AssistantMetadata {
        backend: Some(BackendKind::Responses),
        model: Some(model.to_string()),
        response_id: response.id,
        usage,
        stop_reason: Some(stop_reason),
        timestamp: parsed.metadata.timestamp,
        raw_output,
    };
    Ok(parsed)
}

fn convert_output_item(item: Value) -> Content {
    match item.get("type").and_then(Value::as_str) {
        Some("message") => {
            let text = item
                .get("content")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| match p.get("type").and_then(Value::as_str) {
                            Some("output_text") => p.get("text").and_then(Value::as_str),
                            Some("refusal") => p.get("refusal").and_then(Value::as_str),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();
            Content::text(text)
        }
        Some("function_call") => {
            let call_id = item.get("call_id").and_then(Value::as_str);
            let name = item.get("name").and_then(Value::as_str);
            match (call_id, name) {
                (Some(call_id), Some(name)) => {
                    let raw = item.get("arguments").and_then(Value::as_str).unwrap_or("{}");
                    let arguments = serde_json::from_str(raw)
                        .unwrap_or_else(|_| Value::String(raw.to_string()));
                    Content::tool_call(call_id, name, arguments)
                }
                _ => {
                    tracing::warn!("function_call item without call_id or name; keeping it opaque");
                    Content::opaque(item)
                }
            }
        }
        other => {
            tracing::debug!("keeping {:?} output item as opaque", other);
            Content::opaque(item)
        }
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    input: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<Value>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    output_tokens_details: Option<OutputTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct OutputTokensDetails {
    #[serde(default)]
    reasoning_tokens: u32,
}
