//! Backend implementations

pub mod chat_completions;
pub mod responses;

use crate::{Error, Result};

/// Get an API key from the provided value or an environment variable
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}

/// Map a reqwest-eventsource failure onto our error type.
///
/// Status failures keep the response body so API error details survive.
pub(crate) async fn map_eventsource_error(err: reqwest_eventsource::Error) -> Error {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            Error::from_status(status.as_u16(), &body)
        }
        reqwest_eventsource::Error::Transport(e) => Error::Http(e),
        other => Error::Sse(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_api_key_prefers_provided() {
        let key = get_api_key(Some("sk-explicit"), "REFLEX_TEST_UNSET_KEY").unwrap();
        assert_eq!(key, "sk-explicit");
    }

    #[test]
    fn test_get_api_key_missing() {
        let err = get_api_key(None, "REFLEX_TEST_DEFINITELY_UNSET_KEY").unwrap_err();
        assert!(matches!(err, Error::InvalidApiKey));
    }
}
