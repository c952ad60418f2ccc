//! reflex-agent: Tool orchestration and iterative refinement
//!
//! This crate drives multi-turn conversations in which the model may request
//! tools, runs those tools concurrently with per-call isolation, and wraps the
//! conversation in a draft → critique → revise loop that stops on convergence
//! or when the iteration budget is spent.

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod feedback;
pub mod metric;
pub mod orchestrator;
pub mod prompts;
pub mod reflection;
pub mod registry;
pub mod retry;
pub mod tool;

#[cfg(test)]
mod testing;

pub use config::{ExecutorConfig, RunConfig, StepConfig};
pub use driver::{ConversationDriver, ConversationResult, DriverOptions, ToolCallRecord};
pub use error::{ConversationFailure, Error, FailureReason, Result};
pub use events::{Phase, RunEvent};
pub use executor::{ExecutionStats, ToolExecutor, ToolStats};
pub use feedback::{Feedback, Fix, RubricScore};
pub use metric::{ChangeMetric, DiffRatio, SizeDelta, metric_by_name};
pub use orchestrator::Orchestrator;
pub use prompts::{ArtifactPrompts, ChartCodePrompts, EssayPrompts, ResearchReportPrompts};
pub use reflection::{Iteration, ReflectionController, ReflectionResult, Termination};
pub use registry::ToolRegistry;
pub use retry::RetryConfig;
pub use tool::{BoxedTool, FnTool, Tool, ToolError, ToolInvocationRequest, ToolResult};
