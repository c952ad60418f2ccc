//! Progress output for run events

use reflex_agent::{Phase, RunEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

fn phase_str(phase: Phase) -> &'static str {
    match phase {
        Phase::Drafting => "drafting",
        Phase::Reflecting => "reflecting",
        Phase::Revising => "revising",
    }
}

/// One progress line for `event`, or `None` for events not shown
pub fn describe(event: &RunEvent) -> Option<String> {
    match event {
        RunEvent::TurnStart { .. } | RunEvent::TurnEnd { tool_calls: 0, .. } => None,
        RunEvent::TurnEnd {
            turn_number,
            tool_calls,
            ..
        } => Some(format!("[turn {}: {} tool call(s)]", turn_number, tool_calls)),
        RunEvent::TurnRetry {
            attempt,
            delay_ms,
            error,
        } => Some(format!(
            "[model call failed, retry {} in {}ms: {}]",
            attempt, delay_ms, error
        )),
        RunEvent::ToolExecutionStart {
            tool_name,
            arguments,
            ..
        } => Some(format!(
            "[Running {} {}]",
            tool_name,
            truncate_chars(&arguments.to_string(), 120)
        )),
        RunEvent::ToolExecutionEnd {
            tool_name,
            error: Some(error),
            ..
        } => Some(format!("[{} failed: {}]", tool_name, error)),
        RunEvent::ToolExecutionEnd {
            tool_name,
            duration_ms,
            ..
        } => Some(format!("[{} done in {}ms]", tool_name, duration_ms)),
        RunEvent::IterationStart { index, phase } => {
            Some(format!("== v{}: {} ==", index, phase_str(*phase)))
        }
        RunEvent::IterationEnd {
            index,
            size,
            change: Some(change),
        } => Some(format!("v{}: {} words, change {:.3}", index, size, change)),
        RunEvent::IterationEnd { index, size, .. } => {
            Some(format!("v{}: {} words", index, size))
        }
        RunEvent::CritiqueRetry {
            attempt, reason, ..
        } => Some(format!("[critique unusable ({}), attempt {}]", reason, attempt)),
        RunEvent::RunEnd { outcome, .. } => Some(format!("run finished: {}", outcome)),
    }
}

/// Print events to stderr until the channel closes
pub fn spawn_printer(mut receiver: broadcast::Receiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        eprintln!("{}", line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("progress printer skipped {} event(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé...");
    }

    #[test]
    fn test_describe_tool_events() {
        let start = RunEvent::ToolExecutionStart {
            correlation_id: "c1".into(),
            tool_name: "arxiv_search".into(),
            arguments: json!({"query": "llm"}),
        };
        assert_eq!(
            describe(&start).unwrap(),
            r#"[Running arxiv_search {"query":"llm"}]"#
        );

        let failed = RunEvent::ToolExecutionEnd {
            correlation_id: "c1".into(),
            tool_name: "arxiv_search".into(),
            error: Some("timeout".into()),
            duration_ms: 60000,
        };
        assert_eq!(describe(&failed).unwrap(), "[arxiv_search failed: timeout]");
    }

    #[test]
    fn test_describe_iterations() {
        let end = RunEvent::IterationEnd {
            index: 2,
            size: 120,
            change: Some(0.25),
        };
        assert_eq!(describe(&end).unwrap(), "v2: 120 words, change 0.250");
        assert!(describe(&RunEvent::TurnStart { turn_number: 1 }).is_none());
    }
}
