//! The model backend seam

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::Result,
    providers::{
        self, chat_completions::ChatCompletionsBackend, responses::ResponsesBackend,
    },
    types::{BackendKind, ModelRequest, ModelResponse},
};

/// Default endpoint root for OpenAI-compatible servers
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A generative model that answers one request with one output bundle.
///
/// Implementations must return every output item they receive, in order,
/// including items they cannot interpret (as [`crate::Content::Opaque`]).
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Which wire protocol this backend speaks
    fn kind(&self) -> BackendKind;

    /// Send the conversation and tool schemas, wait for the full response
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

/// Build a backend for `kind`.
///
/// The key falls back to `OPENAI_API_KEY`; the base URL to [`DEFAULT_BASE_URL`].
pub fn create_backend(
    kind: BackendKind,
    api_key: Option<&str>,
    base_url: Option<&str>,
) -> Result<Arc<dyn ModelBackend>> {
    let api_key = providers::get_api_key(api_key, "OPENAI_API_KEY")?;
    let base_url = base_url
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/')
        .to_string();

    tracing::debug!("creating {} backend at {}", kind, base_url);

    let backend: Arc<dyn ModelBackend> = match kind {
        BackendKind::ChatCompletions => Arc::new(ChatCompletionsBackend::new(api_key, base_url)),
        BackendKind::Responses => Arc::new(ResponsesBackend::new(api_key, base_url)),
    };
    Ok(backend)
}
