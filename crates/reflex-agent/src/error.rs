//! Error types for reflex-agent

use reflex_ai::Message;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using reflex-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the orchestration core.
///
/// Per-tool failures never appear here; they are captured in
/// [`crate::ToolResult::error`] and handed back to the model.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model backend layer
    #[error(transparent)]
    Ai(#[from] reflex_ai::Error),

    /// A tool with this name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// No tool with this name is registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A conversation run ended in the failed state
    #[error("{0}")]
    Conversation(Box<ConversationFailure>),

    /// The critique step never produced parseable feedback
    #[error("Structured output could not be parsed after {attempts} attempt(s): {reason}")]
    StructuredOutputParse {
        attempts: u32,
        reason: String,
        /// Raw text of the last rejected response
        last_output: String,
    },

    /// The run configuration was rejected at entry
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// The caller cancelled the run between steps
    #[error("Run cancelled")]
    Cancelled,
}

impl Error {
    /// The failure details, if this is a failed conversation
    pub fn as_conversation_failure(&self) -> Option<&ConversationFailure> {
        match self {
            Error::Conversation(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ConversationFailure> for Error {
    fn from(failure: ConversationFailure) -> Self {
        Error::Conversation(Box::new(failure))
    }
}

/// Why a conversation stopped without a final answer
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The model asked for a tool that is not registered
    #[error("model requested unknown tool '{tool_name}' (call {correlation_id})")]
    UnknownToolRequested {
        tool_name: String,
        correlation_id: String,
    },

    /// The model kept requesting tools past the turn budget
    #[error("turn limit of {max_turns} exceeded")]
    TurnLimitExceeded { max_turns: u32 },

    /// The backend failed and retries (if any) were exhausted
    #[error("model backend failed: {message}")]
    Backend { message: String },

    /// Cancellation was observed before the next model call or tool batch
    #[error("cancelled")]
    Cancelled,
}

/// A failed conversation with the state needed to diagnose it
#[derive(Error, Debug, Clone)]
#[error("conversation failed after {turns} turn(s): {reason}")]
pub struct ConversationFailure {
    pub reason: FailureReason,
    /// Conversation as it stood when the run failed
    pub conversation: Vec<Message>,
    /// Model calls made before failing
    pub turns: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        let err: Error = ConversationFailure {
            reason: FailureReason::TurnLimitExceeded { max_turns: 3 },
            conversation: vec![],
            turns: 3,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "conversation failed after 3 turn(s): turn limit of 3 exceeded"
        );
        assert!(err.as_conversation_failure().is_some());
    }

    #[test]
    fn test_unknown_tool_reason_names_call() {
        let reason = FailureReason::UnknownToolRequested {
            tool_name: "rm_rf".into(),
            correlation_id: "call_9".into(),
        };
        assert!(reason.to_string().contains("rm_rf"));
        assert!(reason.to_string().contains("call_9"));
    }
}
