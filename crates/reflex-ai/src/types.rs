//! Core types for model interactions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Wire protocol spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// OpenAI-compatible `/chat/completions`
    ChatCompletions,
    /// OpenAI `/responses`
    Responses,
}

impl BackendKind {
    /// Stable name used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ChatCompletions => "chat-completions",
            BackendKind::Responses => "responses",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "chat-completions" | "chat" | "completions" => Ok(BackendKind::ChatCompletions),
            "responses" => Ok(BackendKind::Responses),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
    /// Reasoning tokens, when the backend reports them
    #[serde(default)]
    pub reasoning: u32,
}

impl Usage {
    /// Add another turn's usage to this total
    pub fn accumulate(&mut self, other: &Usage) {
        self.input += other.input;
        self.output += other.output;
        self.reasoning += other.reasoning;
    }
}

/// Reason why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of response
    Stop,
    /// Maximum tokens reached
    Length,
    /// Tool use requested
    ToolUse,
}

/// One item of model input or output.
///
/// `Opaque` holds any backend item this crate does not interpret (reasoning
/// state, provider-specific annotations). It is never inspected and must be
/// sent back exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Text content
    Text { text: String },
    /// Tool call request
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Uninterpreted backend item, replayed verbatim
    Opaque { payload: serde_json::Value },
}

impl Content {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool call
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Wrap a raw backend item
    pub fn opaque(payload: serde_json::Value) -> Self {
        Self::Opaque { payload }
    }

    /// Get text if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Check if this is a tool call
    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }
}

/// Messages that make up a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// User message
    User {
        content: Vec<Content>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Assistant output bundle, stored exactly as the backend returned it
    Assistant {
        content: Vec<Content>,
        #[serde(flatten)]
        metadata: AssistantMetadata,
    },
    /// Result of one tool call
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default)]
        timestamp: i64,
    },
}

/// Metadata for assistant messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMetadata {
    pub backend: Option<BackendKind>,
    pub model: Option<String>,
    /// Backend-assigned response identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub timestamp: i64,
    /// Output items exactly as the backend sent them, for backends that
    /// require byte-for-byte replay. Empty when content can be rebuilt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_output: Vec<serde_json::Value>,
}

impl Message {
    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![Content::text(text)],
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an assistant message from an output bundle
    pub fn assistant(content: Vec<Content>) -> Self {
        Self::Assistant {
            content,
            metadata: AssistantMetadata {
                timestamp: chrono::Utc::now().timestamp_millis(),
                ..Default::default()
            },
        }
    }

    /// Create a tool result message
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output,
            error,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Get the role as a string
    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool_result",
        }
    }

    /// Get the content items (tool results carry a value instead and return none)
    pub fn content(&self) -> &[Content] {
        match self {
            Self::User { content, .. } => content,
            Self::Assistant { content, .. } => content,
            Self::ToolResult { .. } => &[],
        }
    }

    /// Extract all tool calls from an assistant message
    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        match self {
            Self::Assistant { content, .. } => tool_calls_in(content),
            _ => vec![],
        }
    }

    /// Get combined text content
    pub fn text(&self) -> String {
        match self {
            Self::ToolResult { output, error, .. } => tool_output_text(output, error.as_deref()),
            _ => text_in(self.content()),
        }
    }
}

fn tool_calls_in(content: &[Content]) -> Vec<(&str, &str, &serde_json::Value)> {
    content
        .iter()
        .filter_map(|c| match c {
            Content::ToolCall {
                id,
                name,
                arguments,
            } => Some((id.as_str(), name.as_str(), arguments)),
            _ => None,
        })
        .collect()
}

fn text_in(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|c| c.as_text())
        .collect::<Vec<_>>()
        .join("")
}

/// Render a tool result the way it is sent back to the model.
///
/// Failures are sent as `{"error": "..."}`; string outputs are sent as-is and
/// any other value as compact JSON.
pub fn tool_output_text(output: &serde_json::Value, error: Option<&str>) -> String {
    if let Some(err) = error {
        return serde_json::json!({ "error": err }).to_string();
    }
    match output {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (used in API calls)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Sampling parameters for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// Everything a backend needs for one model call
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Model identifier
    pub model: String,
    /// System instruction
    pub system_prompt: Option<String>,
    /// Conversation so far
    pub messages: Vec<Message>,
    /// Tools the model may request
    pub tools: Vec<ToolDefinition>,
    pub sampling: SamplingParams,
}

impl ModelRequest {
    /// Create an empty request for a model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the system instruction
    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Replace the message list
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Replace the tool list
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set sampling parameters
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Add a message to the request
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// One model turn: the ordered output bundle plus metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Vec<Content>,
    pub metadata: AssistantMetadata,
}

impl ModelResponse {
    /// Create a response from content items
    pub fn new(content: Vec<Content>) -> Self {
        Self {
            content,
            metadata: AssistantMetadata {
                timestamp: chrono::Utc::now().timestamp_millis(),
                ..Default::default()
            },
        }
    }

    /// Tool calls requested in this turn, in output order
    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        tool_calls_in(&self.content)
    }

    /// Whether the model asked for any tool
    pub fn has_tool_calls(&self) -> bool {
        self.content.iter().any(Content::is_tool_call)
    }

    /// Combined text output
    pub fn text(&self) -> String {
        text_in(&self.content)
    }

    /// Convert into the assistant message appended to the conversation.
    /// Every item is kept, including opaque ones.
    pub fn into_message(self) -> Message {
        Message::Assistant {
            content: self.content,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(
            "chat-completions".parse::<BackendKind>().unwrap(),
            BackendKind::ChatCompletions
        );
        assert_eq!(
            "chat_completions".parse::<BackendKind>().unwrap(),
            BackendKind::ChatCompletions
        );
        assert_eq!(
            "Responses".parse::<BackendKind>().unwrap(),
            BackendKind::Responses
        );
        assert!("anthropic".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_response_keeps_opaque_items_in_message() {
        let response = ModelResponse::new(vec![
            Content::opaque(json!({"type": "reasoning", "id": "rs_1", "summary": []})),
            Content::tool_call("call_1", "search", json!({"q": "x"})),
        ]);
        assert!(response.has_tool_calls());

        let message = response.into_message();
        let content = message.content();
        assert_eq!(content.len(), 2);
        assert!(matches!(&content[0], Content::Opaque { payload } if payload["id"] == "rs_1"));
        assert_eq!(message.tool_calls(), vec![("call_1", "search", &json!({"q": "x"}))]);
    }

    #[test]
    fn test_message_serde_shape() {
        let msg = Message::tool_result("call_1", "search", json!({"hits": 1}), None);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "tool_result");
        assert_eq!(value["tool_call_id"], "call_1");
        assert!(value.get("error").is_none());

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back.text(), r#"{"hits":1}"#);
    }

    #[test]
    fn test_tool_output_text() {
        assert_eq!(tool_output_text(&json!("plain"), None), "plain");
        assert_eq!(tool_output_text(&json!({"hits": 2}), None), r#"{"hits":2}"#);
        assert_eq!(
            tool_output_text(&json!(null), Some("timeout")),
            r#"{"error":"timeout"}"#
        );
    }

    #[test]
    fn test_usage_accumulate() {
        let mut total = Usage::default();
        total.accumulate(&Usage {
            input: 10,
            output: 5,
            reasoning: 2,
        });
        total.accumulate(&Usage {
            input: 1,
            output: 1,
            reasoning: 0,
        });
        assert_eq!(total.input, 11);
        assert_eq!(total.output, 6);
        assert_eq!(total.reasoning, 2);
    }
}
