//! Draft → critique → revise loop with convergence detection

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reflex_ai::{Message, ModelBackend, ModelRequest, ModelResponse, Usage};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::{RunConfig, StepConfig},
    driver::{ConversationDriver, DriverOptions, ToolCallRecord},
    error::{Error, Result},
    events::{Phase, RunEvent},
    executor::{ExecutionStats, ToolExecutor},
    feedback::Feedback,
    metric::{ChangeMetric, DiffRatio, word_count},
    prompts::{ArtifactPrompts, strict_json_reminder},
    retry::{RetryConfig, complete_with_retry},
};

/// One artifact version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-based
    pub index: u32,
    pub artifact: String,
    /// Whitespace word count of `artifact`
    pub size: usize,
    /// Critique this version was revised from; `None` for the draft
    pub feedback: Option<Feedback>,
    /// Change from the previous version; `None` for the draft
    pub change: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// How a successful run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A revision changed less than the threshold
    Converged,
    /// `max_iterations` versions were produced
    Exhausted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Converged => "converged",
            Termination::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a caller needs to persist a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionResult {
    pub run_id: String,
    /// Artifact kind from the prompt set
    pub kind: String,
    pub task: String,
    pub iterations: Vec<Iteration>,
    pub final_artifact: String,
    pub total_iterations: u32,
    pub termination: Termination,
    /// Tool calls made while drafting
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub usage: Usage,
}

impl ReflectionResult {
    pub fn final_iteration(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    /// Per-tool counters for the drafting conversation
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats::from_results(self.tool_calls.iter().map(|r| &r.result))
    }
}

/// Runs the reflection state machine for one artifact.
///
/// Drafting goes through the [`ConversationDriver`] when the prompt set asks
/// for tools and any are registered; every other step is a single model call.
pub struct ReflectionController {
    backend: Arc<dyn ModelBackend>,
    driver: ConversationDriver,
    retry: RetryConfig,
    metric: Arc<dyn ChangeMetric>,
    event_tx: Option<broadcast::Sender<RunEvent>>,
}

impl ReflectionController {
    pub fn new(backend: Arc<dyn ModelBackend>, executor: ToolExecutor) -> Self {
        Self {
            driver: ConversationDriver::new(backend.clone(), executor),
            backend,
            retry: RetryConfig::default(),
            metric: Arc::new(DiffRatio),
            event_tx: None,
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.driver = self.driver.with_retry_config(retry.clone());
        self.retry = retry;
        self
    }

    pub fn with_events(mut self, tx: broadcast::Sender<RunEvent>) -> Self {
        self.driver = self.driver.with_events(tx.clone());
        self.event_tx = Some(tx);
        self
    }

    pub fn with_metric(mut self, metric: Arc<dyn ChangeMetric>) -> Self {
        self.metric = metric;
        self
    }

    /// Produce and refine an artifact for `task`
    pub async fn run(
        &self,
        task: &str,
        config: &RunConfig,
        prompts: &dyn ArtifactPrompts,
        cancel: &CancellationToken,
    ) -> Result<ReflectionResult> {
        config.validate()?;

        let run_id = Uuid::new_v4().to_string();
        tracing::debug!(
            "reflection run {} ({}, max {} iteration(s))",
            run_id,
            prompts.kind(),
            config.max_iterations
        );

        let result = self.run_inner(&run_id, task, config, prompts, cancel).await;
        let outcome = match &result {
            Ok(r) => r.termination.as_str().to_string(),
            Err(e) => format!("failed: {}", e),
        };
        self.emit(RunEvent::RunEnd {
            run_id: run_id.clone(),
            outcome,
        });
        result
    }

    async fn run_inner(
        &self,
        run_id: &str,
        task: &str,
        config: &RunConfig,
        prompts: &dyn ArtifactPrompts,
        cancel: &CancellationToken,
    ) -> Result<ReflectionResult> {
        let system = config
            .system_prompt
            .clone()
            .or_else(|| prompts.system().map(str::to_string));
        let mut usage = Usage::default();
        let mut tool_calls = Vec::new();

        // Drafting
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.emit(RunEvent::IterationStart {
            index: 1,
            phase: Phase::Drafting,
        });
        let draft_prompt = prompts.draft(task);
        let raw = if prompts.uses_tools() && !self.driver.executor().registry().is_empty() {
            let options =
                DriverOptions::for_step(&config.draft, config).with_system(system.clone());
            let conversation = self.driver.run(&draft_prompt, &options, cancel).await?;
            usage.accumulate(&conversation.usage);
            tool_calls = conversation.tool_calls;
            conversation.final_text
        } else {
            let response = self
                .single_shot(&config.draft, system.as_deref(), &draft_prompt, cancel)
                .await?;
            usage.accumulate(&response.metadata.usage);
            response.text()
        };

        let mut iterations = vec![self.record(1, prompts.extract(&raw), None, None)];

        let mut termination = Termination::Exhausted;
        for index in 2..=config.max_iterations {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let previous = iterations[iterations.len() - 1].artifact.clone();

            self.emit(RunEvent::IterationStart {
                index,
                phase: Phase::Reflecting,
            });
            let feedback = self
                .critique(
                    index,
                    task,
                    &previous,
                    config,
                    prompts,
                    system.as_deref(),
                    &mut usage,
                    cancel,
                )
                .await?;

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.emit(RunEvent::IterationStart {
                index,
                phase: Phase::Revising,
            });
            let revise_prompt = prompts.revise(task, &previous, &feedback);
            let response = self
                .single_shot(&config.revision, system.as_deref(), &revise_prompt, cancel)
                .await?;
            usage.accumulate(&response.metadata.usage);
            let artifact = prompts.extract(&response.text());

            let change = self.metric.change(&previous, &artifact);
            tracing::debug!(
                "iteration {}: {} = {:.4} (threshold {})",
                index,
                self.metric.name(),
                change,
                config.convergence_threshold
            );
            iterations.push(self.record(index, artifact, Some(feedback), Some(change)));

            if index == config.max_iterations {
                termination = Termination::Exhausted;
                break;
            }
            if config.stop_on_convergence && change < config.convergence_threshold {
                termination = Termination::Converged;
                break;
            }
        }

        let final_artifact = iterations
            .last()
            .map(|i| i.artifact.clone())
            .unwrap_or_default();

        Ok(ReflectionResult {
            run_id: run_id.to_string(),
            kind: prompts.kind().to_string(),
            task: task.to_string(),
            total_iterations: iterations.len() as u32,
            iterations,
            final_artifact,
            termination,
            tool_calls,
            usage,
        })
    }

    /// Ask for structured feedback, re-prompting more strictly on parse failure
    #[allow(clippy::too_many_arguments)]
    async fn critique(
        &self,
        iteration: u32,
        task: &str,
        artifact: &str,
        config: &RunConfig,
        prompts: &dyn ArtifactPrompts,
        system: Option<&str>,
        usage: &mut Usage,
        cancel: &CancellationToken,
    ) -> Result<Feedback> {
        let base_prompt = prompts.critique(task, artifact);
        let mut reason = String::new();
        let mut last_output = String::new();

        for attempt in 1..=config.max_retries {
            let prompt = if attempt == 1 {
                base_prompt.clone()
            } else {
                format!("{}{}", base_prompt, strict_json_reminder(attempt, &reason))
            };

            let response = self
                .single_shot(&config.reflection, system, &prompt, cancel)
                .await?;
            usage.accumulate(&response.metadata.usage);
            last_output = response.text();

            match Feedback::parse(&last_output) {
                Ok(feedback) => return Ok(feedback),
                Err(e) => {
                    tracing::warn!(
                        "Critique parse failed (attempt {}/{}): {}",
                        attempt,
                        config.max_retries,
                        e
                    );
                    reason = e;
                    if attempt < config.max_retries {
                        self.emit(RunEvent::CritiqueRetry {
                            iteration,
                            attempt: attempt + 1,
                            reason: reason.clone(),
                        });
                    }
                }
            }
        }

        Err(Error::StructuredOutputParse {
            attempts: config.max_retries,
            reason,
            last_output,
        })
    }

    async fn single_shot(
        &self,
        step: &StepConfig,
        system: Option<&str>,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse> {
        let mut request = ModelRequest::new(&step.model)
            .with_messages(vec![Message::user(prompt)])
            .with_sampling(step.sampling());
        request.system_prompt = system.map(str::to_string);

        complete_with_retry(
            self.backend.as_ref(),
            &request,
            &self.retry,
            cancel,
            self.event_tx.as_ref(),
        )
        .await
        .map_err(|e| match e {
            reflex_ai::Error::Aborted => Error::Cancelled,
            other => Error::Ai(other),
        })
    }

    fn record(
        &self,
        index: u32,
        artifact: String,
        feedback: Option<Feedback>,
        change: Option<f64>,
    ) -> Iteration {
        let size = word_count(&artifact);
        self.emit(RunEvent::IterationEnd {
            index,
            size,
            change,
        });
        Iteration {
            index,
            artifact,
            size,
            feedback,
            change,
            timestamp: Utc::now(),
        }
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}
