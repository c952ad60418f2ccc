//! OpenAI-compatible Chat Completions backend

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::map_eventsource_error;
use crate::{
    backend::ModelBackend,
    error::{Error, Result},
    types::{
        AssistantMetadata, BackendKind, Content, Message, ModelRequest, ModelResponse,
        StopReason, Usage, tool_output_text,
    },
};

/// Chat Completions client
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ChatCompletionsBackend {
    /// Create a backend for `base_url` (e.g. `https://api.openai.com/v1`)
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn build_request(&self, request: &ModelRequest) -> ChatRequest {
        let mut messages = Vec::new();

        if let Some(ref system_prompt) = request.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system_prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            messages.push(convert_message(msg));
        }

        let tools: Option<Vec<ChatTool>> = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| ChatTool {
                        tool_type: "function".to_string(),
                        function: ChatFunction {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                        },
                    })
                    .collect(),
            )
        };

        let has_tools = tools.is_some();
        ChatRequest {
            model: request.model.clone(),
            messages,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            max_tokens: request.sampling.max_tokens,
            temperature: request.sampling.temperature,
            tools,
            tool_choice: if has_tools {
                Some(serde_json::json!("auto"))
            } else {
                None
            },
        }
    }
}

#[async_trait]
impl ModelBackend for ChatCompletionsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ChatCompletions
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.base_url);

        let request_builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);

        let mut event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        let mut acc = ChunkAccumulator::default();

        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        event_source.close();
                        break;
                    }
                    let chunk: StreamChunk = serde_json::from_str(&msg.data)?;
                    acc.push(&chunk);
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    event_source.close();
                    return Err(map_eventsource_error(e).await);
                }
            }
        }

        Ok(acc.finish(&request.model))
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    match msg {
        Message::User { content, .. } => ChatMessage {
            role: "user".to_string(),
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: None,
        }
        .log_skipped_opaque(content),
        Message::Assistant { content, .. } => {
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();

            for c in content {
                match c {
                    Content::Text { text } => text_parts.push(text.clone()),
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    } => {
                        tool_calls.push(ChatToolCall {
                            id: id.clone(),
                            call_type: "function".to_string(),
                            function: ChatFunctionCall {
                                name: name.clone(),
                                arguments: arguments.to_string(),
                            },
                        });
                    }
                    Content::Opaque { .. } => {}
                }
            }

            ChatMessage {
                role: "assistant".to_string(),
                content: if text_parts.is_empty() {
                    None
                } else {
                    Some(text_parts.join(""))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            }
            .log_skipped_opaque(content)
        }
        Message::ToolResult {
            tool_call_id,
            output,
            error,
            ..
        } => ChatMessage {
            role: "tool".to_string(),
            content: Some(tool_output_text(output, error.as_deref())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

impl ChatMessage {
    /// Opaque items have no Chat Completions encoding
    fn log_skipped_opaque(self, content: &[Content]) -> Self {
        let skipped = content
            .iter()
            .filter(|c| matches!(c, Content::Opaque { .. }))
            .count();
        if skipped > 0 {
            tracing::debug!(
                "skipping {} opaque item(s) in {} message for chat completions",
                skipped,
                self.role
            );
        }
        self
    }
}

/// Upper bound on distinct tool call slots in one streamed response
const MAX_TOOL_CALLS: usize = 128;

/// Folds streamed deltas into one response.
///
/// Tool call fragments are keyed by their `index`; arguments arrive as string
/// pieces and are parsed once the stream ends.
#[derive(Debug, Default)]
struct ChunkAccumulator {
    id: Option<String>,
    text: String,
    tool_calls: Vec<(String, String, String)>,
    finish_reason: Option<String>,
    usage: Usage,
}

impl ChunkAccumulator {
    fn push(&mut self, chunk: &StreamChunk) {
        if self.id.is_none() {
            self.id = chunk.id.clone();
        }

        for choice in &chunk.choices {
            if let Some(ref content) = choice.delta.content {
                self.text.push_str(content);
            }

            if let Some(ref tcs) = choice.delta.tool_calls {
                for tc in tcs {
                    let idx = match usize::try_from(tc.index) {
                        Ok(idx) if idx < MAX_TOOL_CALLS => idx,
                        _ => {
                            tracing::warn!("ignoring tool call delta with index {}", tc.index);
                            continue;
                        }
                    };
                    while self.tool_calls.len() <= idx {
                        self.tool_calls
                            .push((String::new(), String::new(), String::new()));
                    }
                    if let Some(ref id) = tc.id {
                        self.tool_calls[idx].0 = id.clone();
                    }
                    if let Some(ref function) = tc.function {
                        if let Some(ref name) = function.name {
                            self.tool_calls[idx].1 = name.clone();
                        }
                        if let Some(ref args) = function.arguments {
                            self.tool_calls[idx].2.push_str(args);
                        }
                    }
                }
            }

            if let Some(ref reason) = choice.finish_reason {
                self.finish_reason = Some(reason.clone());
            }
        }

        if let Some(ref usage) = chunk.usage {
            self.usage.input = usage.prompt_tokens;
            self.usage.output = usage.completion_tokens;
            if let Some(ref details) = usage.completion_tokens_details {
                self.usage.reasoning = details.reasoning_tokens;
            }
        }
    }

    fn finish(self, model: &str) -> ModelResponse {
        let mut content = Vec::new();

        if !self.text.is_empty() {
            content.push(Content::text(self.text));
        }

        for (id, name, args) in self.tool_calls {
            if id.is_empty() || name.is_empty() {
                continue;
            }
            let arguments = if args.trim().is_empty() {
                serde_json::json!({})
            } else {
                // Keep malformed arguments as a string so schema validation reports them
                serde_json::from_str(&args).unwrap_or(serde_json::Value::String(args))
            };
            content.push(Content::tool_call(id, name, arguments));
        }

        let stop_reason = match self.finish_reason.as_deref() {
            Some("length") => StopReason::Length,
            Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
            _ if content.iter().any(Content::is_tool_call) => StopReason::ToolUse,
            _ => StopReason::Stop,
        };

        let mut response = ModelResponse::new(content);
        response.metadata = AssistantMetadata {
            backend: Some(BackendKind::ChatCompletions),
            model: Some(model.to_string()),
            response_id: self.id,
            usage: self.usage,
            stop_reason: Some(stop_reason),
            timestamp: response.metadata.timestamp,
            raw_output: Vec::new(),
        };
        response
    }
}

// Request types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: i32,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u32,
}
