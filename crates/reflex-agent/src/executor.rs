//! Concurrent execution of one turn's tool calls

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ExecutorConfig,
    events::RunEvent,
    registry::ToolRegistry,
    tool::{BoxedTool, ToolInvocationRequest, ToolResult},
};

/// Counters for a single tool
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStats {
    pub calls: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub total_ms: u64,
}

/// Per-tool counters for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub tools: BTreeMap<String, ToolStats>,
}

impl ExecutionStats {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ToolResult>) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.record(result);
        }
        stats
    }

    pub fn total_calls(&self) -> u64 {
        self.tools.values().map(|s| s.calls).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.tools.values().map(|s| s.errors).sum()
    }

    fn record(&mut self, result: &ToolResult) {
        let stats = self.tools.entry(result.tool_name.clone()).or_default();
        stats.calls += 1;
        stats.total_ms += result.duration_ms;
        match result.error.as_deref() {
            Some(TIMEOUT) => {
                stats.errors += 1;
                stats.timeouts += 1;
            }
            Some(_) => stats.errors += 1,
            None => {}
        }
    }
}

const TIMEOUT: &str = "timeout";
const CANCELLED: &str = "cancelled";

enum Outcome {
    Output(Value),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Runs a batch of tool calls concurrently and returns results in request order.
///
/// Each call is isolated: a tool that errors, panics or exceeds the per-call
/// timeout yields a result with `error` set and leaves its siblings untouched.
/// Nothing here retries. The executor holds no per-run state; the concurrency
/// cap applies to one batch at a time.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
    event_tx: Option<broadcast::Sender<RunEvent>>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            config,
            event_tx: None,
        }
    }

    /// Emit `ToolExecutionStart`/`ToolExecutionEnd` on this channel
    pub fn with_events(mut self, tx: broadcast::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute every request; `results[i]` answers `requests[i]`.
    pub async fn execute(
        &self,
        requests: &[ToolInvocationRequest],
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        let limiter = self
            .config
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut pending = Vec::with_capacity(requests.len());

        for request in requests {
            self.emit(RunEvent::ToolExecutionStart {
                correlation_id: request.correlation_id.clone(),
                tool_name: request.tool_name.clone(),
                arguments: request.arguments.clone(),
            });

            let tool = match self.registry.resolve(&request.tool_name) {
                Ok(tool) => tool,
                Err(e) => {
                    pending.push(Err(e.to_string()));
                    continue;
                }
            };
            if let Some(err) = self
                .registry
                .validate(&request.tool_name, &request.arguments)
            {
                pending.push(Err(err));
                continue;
            }

            let handle = tokio::spawn(run_call(
                tool,
                request.arguments.clone(),
                self.config.call_timeout,
                cancel.clone(),
                limiter.clone(),
            ));
            pending.push(Ok(handle));
        }

        let mut results = Vec::with_capacity(requests.len());
        for (request, slot) in requests.iter().zip(pending) {
            let (outcome, elapsed) = match slot {
                Ok(handle) => match handle.await {
                    Ok(done) => done,
                    Err(join_err) => (Outcome::Failed(describe_join_error(join_err)), 0),
                },
                Err(message) => (Outcome::Failed(message), 0),
            };

            let mut result = match outcome {
                Outcome::Output(value) => ToolResult::success(request, value),
                Outcome::Failed(message) => ToolResult::failure(request, message),
                Outcome::TimedOut => ToolResult::failure(request, TIMEOUT),
                Outcome::Cancelled => ToolResult::failure(request, CANCELLED),
            };
            result.duration_ms = elapsed;

            match &result.error {
                Some(err) => tracing::debug!(
                    "tool {} ({}) failed after {}ms: {}",
                    result.tool_name,
                    result.correlation_id,
                    elapsed,
                    err
                ),
                None => tracing::debug!(
                    "tool {} ({}) finished in {}ms",
                    result.tool_name,
                    result.correlation_id,
                    elapsed
                ),
            }

            self.emit(RunEvent::ToolExecutionEnd {
                correlation_id: result.correlation_id.clone(),
                tool_name: result.tool_name.clone(),
                error: result.error.clone(),
                duration_ms: result.duration_ms,
            });
            results.push(result);
        }

        results
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

async fn run_call(
    tool: BoxedTool,
    arguments: Value,
    timeout: Duration,
    cancel: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
) -> (Outcome, u64) {
    let _permit = match limiter {
        Some(sem) => tokio::select! {
            _ = cancel.cancelled() => return (Outcome::Cancelled, 0),
            permit = sem.acquire_owned() => match permit {
                Ok(permit) => Some(permit),
                Err(_) => return (Outcome::Failed("executor is shut down".into()), 0),
            },
        },
        None => None,
    };

    let started = Instant::now();
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Outcome::Cancelled,
        res = tokio::time::timeout(timeout, tool.execute(arguments, cancel.clone())) => match res {
            Ok(Ok(value)) => Outcome::Output(value),
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(_) => Outcome::TimedOut,
        },
    };
    (outcome, started.elapsed().as_millis() as u64)
}

fn describe_join_error(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        let panic = err.into_panic();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("panicked: {}", message)
    } else {
        CANCELLED.to_string()
    }
}
