//! Error types for reflex-ai

use thiserror::Error;

/// Result type alias using reflex-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a model backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Request was aborted before completion
    #[error("Request aborted")]
    Aborted,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Response did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Backend name could not be parsed
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Build an error from a non-success HTTP status and its body.
    ///
    /// OpenAI-style bodies (`{"error": {"type": .., "message": ..}}`) are unpacked;
    /// anything else is reported with the status code as the type.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 429 {
            return Self::RateLimited { retry_after: None };
        }
        if status == 401 {
            return Self::InvalidApiKey;
        }

        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let detail = parsed.as_ref().and_then(|v| v.get("error"));
        let error_type = detail
            .and_then(|e| e.get("type"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("http_{}", status));
        let message = detail
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        Self::Api {
            error_type,
            message,
        }
    }

    /// Check if this error is worth retrying the whole request
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } | Error::Sse(_) => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("rate_limit")
                    || et.contains("overloaded")
                    || et.contains("server_error")
                    || matches!(et.as_str(), "http_500" | "http_502" | "http_503" | "http_504")
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }
}
