//! Run event types

use reflex_ai::Usage;
use serde::{Deserialize, Serialize};

/// Which step produced an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Drafting,
    Reflecting,
    Revising,
}

/// Events emitted while a run is in progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A model call is about to be made
    TurnStart { turn_number: u32 },

    /// The model answered
    TurnEnd {
        turn_number: u32,
        tool_calls: usize,
        usage: Usage,
    },

    /// A model call failed and will be retried
    TurnRetry {
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// Tool execution started
    ToolExecutionStart {
        correlation_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed
    ToolExecutionEnd {
        correlation_id: String,
        tool_name: String,
        error: Option<String>,
        duration_ms: u64,
    },

    /// A reflection step started
    IterationStart { index: u32, phase: Phase },

    /// An artifact version was produced
    IterationEnd {
        index: u32,
        size: usize,
        /// Change from the previous version; absent for the draft
        change: Option<f64>,
    },

    /// Critique output was rejected and the step will be re-prompted
    CritiqueRetry {
        iteration: u32,
        attempt: u32,
        reason: String,
    },

    /// The run finished, successfully or not
    RunEnd { run_id: String, outcome: String },
}

impl RunEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunEnd { .. })
    }
}
