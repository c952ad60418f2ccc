//! Multi-turn model ↔ tool conversation

use std::sync::Arc;

use reflex_ai::{Message, ModelBackend, ModelRequest, SamplingParams, Usage};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{RunConfig, StepConfig},
    error::{ConversationFailure, FailureReason, Result},
    events::RunEvent,
    executor::{ExecutionStats, ToolExecutor},
    retry::{RetryConfig, complete_with_retry},
    tool::{ToolInvocationRequest, ToolResult},
};

/// Per-run settings for [`ConversationDriver::run`]
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub model: String,
    pub system_prompt: Option<String>,
    pub sampling: SamplingParams,
    pub max_turns: u32,
    /// Offer the registry's tools to the model
    pub offer_tools: bool,
}

impl DriverOptions {
    pub fn for_step(step: &StepConfig, config: &RunConfig) -> Self {
        Self {
            model: step.model.clone(),
            system_prompt: config.system_prompt.clone(),
            sampling: step.sampling(),
            max_turns: config.max_turns,
            offer_tools: true,
        }
    }

    pub fn with_system(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }
}

/// One dispatched call and its result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub turn: u32,
    pub request: ToolInvocationRequest,
    pub result: ToolResult,
}

/// A conversation that reached a final answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResult {
    pub final_text: String,
    pub conversation: Vec<Message>,
    /// Model calls made, including the final one
    pub turns: u32,
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: Usage,
}

impl ConversationResult {
    /// Per-tool counters for this conversation
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats::from_results(self.tool_calls.iter().map(|r| &r.result))
    }
}

enum State {
    AwaitingModel,
    DispatchingTools(Vec<ToolInvocationRequest>),
    Done(String),
    Failed(FailureReason),
}

/// Drives the model until it stops asking for tools.
///
/// Each model turn sees the complete result of the previous one. Assistant
/// output is appended to the conversation exactly as returned, so opaque
/// items are replayed on the next call.
#[derive(Clone)]
pub struct ConversationDriver {
    backend: Arc<dyn ModelBackend>,
    executor: ToolExecutor,
    retry: RetryConfig,
    event_tx: Option<broadcast::Sender<RunEvent>>,
}

impl ConversationDriver {
    pub fn new(backend: Arc<dyn ModelBackend>, executor: ToolExecutor) -> Self {
        Self {
            backend,
            executor,
            retry: RetryConfig::default(),
            event_tx: None,
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_events(mut self, tx: broadcast::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Run from a single user prompt
    pub async fn run(
        &self,
        prompt: &str,
        options: &DriverOptions,
        cancel: &CancellationToken,
    ) -> Result<ConversationResult> {
        self.run_messages(vec![Message::user(prompt)], options, cancel)
            .await
    }

    /// Run from an existing conversation
    pub async fn run_messages(
        &self,
        mut conversation: Vec<Message>,
        options: &DriverOptions,
        cancel: &CancellationToken,
    ) -> Result<ConversationResult> {
        let registry = self.executor.registry();
        let tools = if options.offer_tools {
            registry.schemas()
        } else {
            Vec::new()
        };

        let mut turns = 0u32;
        let mut usage = Usage::default();
        let mut tool_calls = Vec::new();
        let mut state = State::AwaitingModel;

        loop {
            state = match state {
                State::AwaitingModel => {
                    if cancel.is_cancelled() {
                        State::Failed(FailureReason::Cancelled)
                    } else if turns >= options.max_turns {
                        State::Failed(FailureReason::TurnLimitExceeded {
                            max_turns: options.max_turns,
                        })
                    } else {
                        turns += 1;
                        tracing::debug!("turn {}/{}", turns, options.max_turns);
                        self.emit(RunEvent::TurnStart { turn_number: turns });

                        let request = ModelRequest {
                            model: options.model.clone(),
                            system_prompt: options.system_prompt.clone(),
                            messages: conversation.clone(),
                            tools: tools.clone(),
                            sampling: options.sampling.clone(),
                        };

                        match complete_with_retry(
                            self.backend.as_ref(),
                            &request,
                            &self.retry,
                            cancel,
                            self.event_tx.as_ref(),
                        )
                        .await
                        {
                            Err(reflex_ai::Error::Aborted) => {
                                State::Failed(FailureReason::Cancelled)
                            }
                            Err(e) => State::Failed(FailureReason::Backend {
                                message: e.to_string(),
                            }),
                            Ok(response) => {
                                usage.accumulate(&response.metadata.usage);
                                let requests: Vec<ToolInvocationRequest> = response
                                    .tool_calls()
                                    .into_iter()
                                    .map(|(id, name, args)| {
                                        ToolInvocationRequest::new(id, name, args.clone())
                                    })
                                    .collect();
                                self.emit(RunEvent::TurnEnd {
                                    turn_number: turns,
                                    tool_calls: requests.len(),
                                    usage: response.metadata.usage.clone(),
                                });

                                let final_text = response.text();
                                conversation.push(response.into_message());

                                if requests.is_empty() {
                                    State::Done(final_text)
                                } else if let Some(unknown) = requests.iter().find(|r| {
                                    !options.offer_tools || !registry.contains(&r.tool_name)
                                }) {
                                    State::Failed(FailureReason::UnknownToolRequested {
                                        tool_name: unknown.tool_name.clone(),
                                        correlation_id: unknown.correlation_id.clone(),
                                    })
                                } else {
                                    State::DispatchingTools(requests)
                                }
                            }
                        }
                    }
                }

                State::DispatchingTools(requests) => {
                    if cancel.is_cancelled() {
                        State::Failed(FailureReason::Cancelled)
                    } else {
                        tracing::debug!("dispatching {} tool call(s)", requests.len());
                        let results = self.executor.execute(&requests, cancel).await;
                        for (request, result) in requests.into_iter().zip(results) {
                            conversation.push(result.to_message());
                            tool_calls.push(ToolCallRecord {
                                turn: turns,
                                request,
                                result,
                            });
                        }
                        State::AwaitingModel
                    }
                }

                State::Done(final_text) => {
                    tracing::debug!("conversation done after {} turn(s)", turns);
                    return Ok(ConversationResult {
                        final_text,
                        conversation,
                        turns,
                        tool_calls,
                        usage,
                    });
                }

                State::Failed(reason) => {
                    tracing::warn!("conversation failed after {} turn(s): {}", turns, reason);
                    return Err(ConversationFailure {
                        reason,
                        conversation,
                        turns,
                    }
                    .into());
                }
            };
        }
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}
