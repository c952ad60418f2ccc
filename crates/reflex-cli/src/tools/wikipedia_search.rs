//! Background lookups through the Wikipedia (MediaWiki) API

use async_trait::async_trait;
use reflex_agent::{Tool, ToolError};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org/w/api.php";
const USER_AGENT: &str = "reflex/0.1";

/// Summary of the best-matching Wikipedia article
pub struct WikipediaSearchTool {
    client: reqwest::Client,
    base_url: String,
}

impl WikipediaSearchTool {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for WikipediaSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull `{title, summary, url}` out of a `generator=search` response
fn parse_page(body: &Value) -> Result<Value, ToolError> {
    let page = body
        .pointer("/query/pages")
        .and_then(Value::as_array)
        .and_then(|pages| pages.first())
        .ok_or_else(|| ToolError::failed("No results found on Wikipedia."))?;

    let title = page.get("title").and_then(Value::as_str).unwrap_or_default();
    if page.get("missing").is_some() {
        return Err(ToolError::failed(format!("Page '{}' not found.", title)));
    }

    Ok(json!({
        "title": title,
        "summary": page.get("extract").and_then(Value::as_str).unwrap_or_default().trim(),
        "url": page.get("fullurl").and_then(Value::as_str).unwrap_or_default(),
    }))
}

#[async_trait]
impl Tool for WikipediaSearchTool {
    fn name(&self) -> &str {
        "wikipedia_search"
    }

    fn description(&self) -> &str {
        "Look up a Wikipedia article for background, definitions or historical context. Returns the article title, an introductory summary and its url."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Article title or topic, e.g. \"photosynthesis\""
                },
                "sentences": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 10,
                    "description": "Sentences in the summary (default 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing 'query'".into()))?;
        let sentences = arguments
            .get("sentences")
            .and_then(Value::as_u64)
            .unwrap_or(5)
            .to_string();

        tracing::debug!("wikipedia search: {}", query);

        let request = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrlimit", "1"),
                ("prop", "extracts|info"),
                ("inprop", "url"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exsentences", sentences.as_str()),
                ("redirects", "1"),
            ])
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::failed("Operation cancelled")),
            response = request => response.map_err(|e| ToolError::failed(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(format!("Wikipedia returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("Invalid Wikipedia response: {}", e)))?;
        Ok(json!([parse_page(&body)?]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page() {
        let body = json!({
            "batchcomplete": true,
            "query": {"pages": [{
                "pageid": 24544,
                "title": "Photosynthesis",
                "extract": "Photosynthesis is a system of biological processes by which photosynthetic organisms convert light energy into chemical energy.\n",
                "fullurl": "https://en.wikipedia.org/wiki/Photosynthesis"
            }]}
        });

        let page = parse_page(&body).unwrap();
        assert_eq!(page["title"], "Photosynthesis");
        assert_eq!(page["url"], "https://en.wikipedia.org/wiki/Photosynthesis");
        assert!(page["summary"].as_str().unwrap().ends_with("chemical energy."));
    }

    #[test]
    fn test_no_results() {
        let err = parse_page(&json!({"batchcomplete": true})).unwrap_err();
        assert!(err.to_string().contains("No results found"));
    }

    #[test]
    fn test_missing_page() {
        let body = json!({"query": {"pages": [{"title": "Nonexistent", "missing": true}]}});
        let err = parse_page(&body).unwrap_err();
        assert!(err.to_string().contains("'Nonexistent' not found"));
    }
}
