//! Web search through the Tavily API

use async_trait::async_trait;
use reflex_agent::{Tool, ToolError};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// General-purpose web search
pub struct TavilySearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl TavilySearchTool {
    /// `base_url` falls back to `TAVILY_BASE_URL`, then the public endpoint
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .or_else(|| std::env::var("TAVILY_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Keep title, content and url of each hit, then any image URLs
fn parse_results(body: &Value, include_images: bool) -> Vec<Value> {
    let mut results: Vec<Value> = body
        .get("results")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|r| {
                    json!({
                        "title": r.get("title").and_then(Value::as_str).unwrap_or(""),
                        "content": r.get("content").and_then(Value::as_str).unwrap_or(""),
                        "url": r.get("url").and_then(Value::as_str).unwrap_or(""),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if include_images {
        if let Some(images) = body.get("images").and_then(Value::as_array) {
            results.extend(
                images
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|url| json!({ "image_url": url })),
            );
        }
    }
    results
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &str {
        "tavily_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information, news and articles. Returns a list of results with title, content snippet and url."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search keywords or a natural language query"
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 20,
                    "description": "Maximum number of results (default 5)"
                },
                "include_images": {
                    "type": "boolean",
                    "description": "Also return related image URLs"
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
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ToolError::failed("TAVILY_API_KEY not found in environment variables.")
        })?;
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing 'query'".into()))?;
        let max_results = arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(5);
        let include_images = arguments
            .get("include_images")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        tracing::debug!("tavily search: {}", query);

        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({
                "query": query,
                "max_results": max_results,
                "include_images": include_images,
            }))
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::failed("Operation cancelled")),
            response = request => response.map_err(|e| ToolError::failed(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::failed(format!("Tavily returned {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("Invalid Tavily response: {}", e)))?;
        Ok(Value::Array(parse_results(&body, include_images)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results_keeps_core_fields() {
        let body = json!({
            "results": [
                {"title": "Solar", "content": "Panels...", "url": "https://a.example", "score": 0.9},
                {"title": "Wind"}
            ],
            "images": ["https://img.example/1.png"]
        });

        let results = parse_results(&body, false);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["url"], "https://a.example");
        assert!(results[0].get("score").is_none());
        assert_eq!(results[1]["content"], "");

        let with_images = parse_results(&body, true);
        assert_eq!(with_images[2]["image_url"], "https://img.example/1.png");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let tool = TavilySearchTool::new(None, Some("http://127.0.0.1:9".into()));
        let err = tool
            .execute(json!({"query": "x"}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("TAVILY_API_KEY"));
    }
}
