//! Whole-turn retry for model calls

use std::time::Duration;

use reflex_ai::{ModelBackend, ModelRequest, ModelResponse};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::RunEvent;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Call the backend, retrying errors that `is_retryable()`.
///
/// Cancellation is checked before every attempt and during backoff; a
/// cancelled call returns [`reflex_ai::Error::Aborted`].
pub async fn complete_with_retry(
    backend: &dyn ModelBackend,
    request: &ModelRequest,
    retry: &RetryConfig,
    cancel: &CancellationToken,
    events: Option<&broadcast::Sender<RunEvent>>,
) -> reflex_ai::Result<ModelResponse> {
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(reflex_ai::Error::Aborted);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(reflex_ai::Error::Aborted),
            result = backend.complete(request) => result,
        };

        match result {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(
                    "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt + 1,
                    retry.max_retries + 1,
                    e,
                    delay
                );
                if let Some(tx) = events {
                    let _ = tx.send(RunEvent::TurnRetry {
                        attempt: attempt + 1,
                        delay_ms: delay.as_millis() as u64,
                        error: e.to_string(),
                    });
                }
                attempt += 1;
                tokio::select! {
                    _ = cancel.cancelled() => return Err(reflex_ai::Error::Aborted),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use reflex_ai::{Content, ModelResponse};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_for_attempt_caps_at_max() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(cfg.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retries_retryable_then_succeeds() {
        let backend = ScriptedBackend::new(vec![
            Err(reflex_ai::Error::RateLimited { retry_after: None }),
            Err(reflex_ai::Error::api("server_error", "try again")),
            Ok(ModelResponse::new(vec![Content::text("ok")])),
        ]);
        let (tx, mut rx) = broadcast::channel(16);

        let response = complete_with_retry(
            &backend,
            &ModelRequest::new("m"),
            &fast_retry(3),
            &CancellationToken::new(),
            Some(&tx),
        )
        .await
        .unwrap();

        assert_eq!(response.text(), "ok");
        assert_eq!(backend.call_count(), 3);
        assert!(matches!(rx.recv().await.unwrap(), RunEvent::TurnRetry { attempt: 1, .. }));
        assert!(matches!(rx.recv().await.unwrap(), RunEvent::TurnRetry { attempt: 2, .. }));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let backend = ScriptedBackend::new(vec![Err(reflex_ai::Error::InvalidApiKey)]);
        let err = complete_with_retry(
            &backend,
            &ModelRequest::new("m"),
            &fast_retry(3),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, reflex_ai::Error::InvalidApiKey));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let backend = ScriptedBackend::new(
            (0..5)
                .map(|_| Err(reflex_ai::Error::Sse("reset".into())))
                .collect(),
        );
        let err = complete_with_retry(
            &backend,
            &ModelRequest::new("m"),
            &fast_retry(2),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, reflex_ai::Error::Sse(_)));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let backend = ScriptedBackend::new(vec![Ok(ModelResponse::new(vec![]))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = ModelRequest::new("m");
        let err = complete_with_retry(&backend, &request, &fast_retry(1), &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, reflex_ai::Error::Aborted));
        assert_eq!(backend.call_count(), 0);
    }
}
