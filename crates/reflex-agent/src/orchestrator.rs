//! Caller-facing entry points

use std::sync::Arc;

use reflex_ai::ModelBackend;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ExecutorConfig, RunConfig},
    driver::{ConversationDriver, ConversationResult, DriverOptions},
    error::Result,
    events::RunEvent,
    executor::ToolExecutor,
    metric::{ChangeMetric, DiffRatio},
    prompts::ArtifactPrompts,
    reflection::{ReflectionController, ReflectionResult},
    registry::ToolRegistry,
    retry::RetryConfig,
};

/// Owns the injected backend and tool registry shared by every run.
///
/// The registry is read-only once the orchestrator is built, so concurrent
/// runs share it without locking. Each run owns its own conversation,
/// iteration history and tool statistics.
pub struct Orchestrator {
    backend: Arc<dyn ModelBackend>,
    executor: ToolExecutor,
    retry: RetryConfig,
    metric: Arc<dyn ChangeMetric>,
    event_tx: broadcast::Sender<RunEvent>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn ModelBackend>, registry: Arc<ToolRegistry>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            backend,
            executor: ToolExecutor::new(registry, ExecutorConfig::default())
                .with_events(event_tx.clone()),
            retry: RetryConfig::default(),
            metric: Arc::new(DiffRatio),
            event_tx,
        }
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = ToolExecutor::new(self.executor.registry().clone(), config)
            .with_events(self.event_tx.clone());
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metric(mut self, metric: Arc<dyn ChangeMetric>) -> Self {
        self.metric = metric;
        self
    }

    /// Subscribe to events from every run started after this call
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.executor.registry()
    }

    /// Run one tool-calling conversation using the draft step's model
    pub async fn run_conversation(
        &self,
        prompt: &str,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<ConversationResult> {
        config.validate()?;
        self.executor.config().validate()?;
        let options = DriverOptions::for_step(&config.draft, config);
        self.driver().run(prompt, &options, cancel).await
    }

    /// Produce an artifact and refine it until it converges or the budget runs out
    pub async fn run_reflection(
        &self,
        prompt: &str,
        config: &RunConfig,
        prompts: &dyn ArtifactPrompts,
        cancel: &CancellationToken,
    ) -> Result<ReflectionResult> {
        self.executor.config().validate()?;
        ReflectionController::new(self.backend.clone(), self.executor.clone())
            .with_retry_config(self.retry.clone())
            .with_metric(self.metric.clone())
            .with_events(self.event_tx.clone())
            .run(prompt, config, prompts, cancel)
            .await
    }

    fn driver(&self) -> ConversationDriver {
        ConversationDriver::new(self.backend.clone(), self.executor.clone())
            .with_retry_config(self.retry.clone())
            .with_events(self.event_tx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{Error, FailureReason},
        prompts::EssayPrompts,
        reflection::Termination,
        testing::{ScriptedBackend, text, tool_calls},
        tool::ToolError,
    };
    use serde_json::{Value, json};
    use std::time::{Duration, Instant};

    fn orchestrator(backend: Arc<ScriptedBackend>) -> Orchestrator {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(
                "current_time",
                "Current UTC time",
                json!({"type": "object", "properties": {}}),
                |_args: Value| async move { Ok::<_, ToolError>(json!("2026-01-01T00:00:00Z")) },
            )
            .unwrap();
        Orchestrator::new(backend, Arc::new(registry)).with_retry_config(RetryConfig::none())
    }

    #[tokio::test]
    async fn test_run_conversation_emits_events() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            tool_calls(&[("call_1", "current_time", json!({}))]),
            text("It is midnight."),
        ]));
        let orch = orchestrator(backend);
        let mut rx = orch.subscribe();

        let result = orch
            .run_conversation("what time is it?", &RunConfig::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.final_text, "It is midnight.");
        assert_eq!(result.turns, 2);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                RunEvent::TurnStart { .. } => "turn_start",
                RunEvent::TurnEnd { .. } => "turn_end",
                RunEvent::ToolExecutionStart { .. } => "tool_start",
                RunEvent::ToolExecutionEnd { .. } => "tool_end",
                _ => "other",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "turn_start",
                "turn_end",
                "tool_start",
                "tool_end",
                "turn_start",
                "turn_end"
            ]
        );
        assert_eq!(result.stats().total_calls(), 1);
    }

    #[tokio::test]
    async fn test_run_conversation_turn_limit() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            tool_calls(&[("a", "current_time", json!({}))]),
            tool_calls(&[("b", "current_time", json!({}))]),
        ]));
        let config = RunConfig {
            max_turns: 2,
            ..RunConfig::default()
        };

        let err = orchestrator(backend)
            .run_conversation("loop", &config, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err.as_conversation_failure().map(|f| f.reason.clone()),
            Some(FailureReason::TurnLimitExceeded { max_turns: 2 })
        );
    }

    #[tokio::test]
    async fn test_run_conversation_rejects_invalid_config() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let config = RunConfig {
            max_turns: 0,
            ..RunConfig::default()
        };

        let err = orchestrator(backend.clone())
            .run_conversation("q", &config, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConfigValidation(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_share_limits() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn("slow_lookup", "Slow lookup", json!({"type": "object"}), |_| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, ToolError>(json!("found"))
            })
            .unwrap();
        let backend = Arc::new(ScriptedBackend::routed(vec![
            ("first", vec![tool_calls(&[("a", "slow_lookup", json!({}))]), text("one")]),
            ("second", vec![tool_calls(&[("b", "slow_lookup", json!({}))]), text("two")]),
        ]));
        let orch = Orchestrator::new(backend, Arc::new(registry))
            .with_retry_config(RetryConfig::none())
            .with_executor_config(ExecutorConfig {
                max_concurrency: Some(1),
                ..ExecutorConfig::default()
            });
        let cancel = CancellationToken::new();
        let first = RunConfig::default().with_model("first");
        let second = RunConfig::default().with_model("second");

        let started = Instant::now();
        let (a, b) = tokio::join!(
            orch.run_conversation("look up a", &first, &cancel),
            orch.run_conversation("look up b", &second, &cancel)
        );

        assert!(started.elapsed() < Duration::from_millis(350));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.final_text, "one");
        assert_eq!(b.final_text, "two");
        assert_eq!(a.stats().total_calls(), 1);
        assert_eq!(b.stats().total_calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_call_timeout_rejected() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let orch = orchestrator(backend.clone()).with_executor_config(ExecutorConfig {
            call_timeout: Duration::ZERO,
            ..ExecutorConfig::default()
        });

        let err = orch
            .run_conversation("q", &RunConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConfigValidation(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_reflection_single_iteration() {
        let backend = Arc::new(ScriptedBackend::new(vec![text("A short essay.")]));
        let config = RunConfig {
            max_iterations: 1,
            ..RunConfig::default()
        };

        let result = orchestrator(backend.clone())
            .run_reflection("essays", &config, &EssayPrompts, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.final_artifact, "A short essay.");
        assert_eq!(result.termination, Termination::Exhausted);
        assert_eq!(backend.call_count(), 1);
        // Essays draft without tools even when some are registered
        assert!(backend.requests()[0].tools.is_empty());
    }
}
