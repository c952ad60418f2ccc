//! Tool trait and invocation types

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use reflex_ai::{Message, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A failure raised by a tool implementation.
///
/// The executor turns these into [`ToolResult::error`]; they never escape a batch.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Trait for executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: Value, cancel: CancellationToken)
    -> Result<Value, ToolError>;
}

/// Type alias for a shared tool
pub type BoxedTool = Arc<dyn Tool>;

/// Schema advertised to the model for `tool`
pub fn to_definition(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition::new(tool.name(), tool.description(), tool.parameters_schema())
}

type ToolFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

/// A tool backed by an async closure
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    f: Arc<ToolFn>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            f: Arc::new(move |args| Box::pin(f(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(
        &self,
        arguments: Value,
        _cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        (self.f)(arguments).await
    }
}

/// A tool call the model asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub correlation_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolInvocationRequest {
    pub fn new(
        correlation_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Outcome of one dispatched call; exactly one exists per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub correlation_id: String,
    pub tool_name: String,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(request: &ToolInvocationRequest, output: Value) -> Self {
        Self {
            correlation_id: request.correlation_id.clone(),
            tool_name: request.tool_name.clone(),
            output,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failure(request: &ToolInvocationRequest, error: impl Into<String>) -> Self {
        Self {
            correlation_id: request.correlation_id.clone(),
            tool_name: request.tool_name.clone(),
            output: Value::Null,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The tool-result turn appended to the conversation
    pub fn to_message(&self) -> Message {
        Message::tool_result(
            &self.correlation_id,
            &self.tool_name,
            self.output.clone(),
            self.error.clone(),
        )
    }
}
