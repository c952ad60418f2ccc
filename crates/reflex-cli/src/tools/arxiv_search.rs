//! Academic paper search through the arXiv Atom API

use async_trait::async_trait;
use feed_rs::model::Entry;
use reflex_agent::{Tool, ToolError};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://export.arxiv.org/api/query";
const USER_AGENT: &str = "reflex/0.1";

/// Search arXiv for papers
pub struct ArxivSearchTool {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivSearchTool {
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

impl Default for ArxivSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse the hard line wraps arXiv puts in titles and abstracts
fn clean(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn paper(entry: &Entry) -> Value {
    let authors: Vec<String> = entry.authors.iter().map(|a| clean(&a.name)).collect();
    let link_pdf = entry
        .links
        .iter()
        .find(|l| l.title.as_deref() == Some("pdf"))
        .map(|l| l.href.clone());

    json!({
        "title": entry.title.as_ref().map(|t| clean(&t.content)).unwrap_or_default(),
        "authors": authors,
        "published": entry
            .published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        "url": entry.id.trim(),
        "summary": entry.summary.as_ref().map(|t| clean(&t.content)).unwrap_or_default(),
        "link_pdf": link_pdf,
    })
}

/// Parse an Atom feed into paper records
fn parse_feed(body: &[u8]) -> Result<Vec<Value>, feed_rs::parser::ParseFeedError> {
    let feed = feed_rs::parser::parse(body)?;
    Ok(feed.entries.iter().map(paper).collect())
}

#[async_trait]
impl Tool for ArxivSearchTool {
    fn name(&self) -> &str {
        "arxiv_search"
    }

    fn description(&self) -> &str {
        "Search arXiv for research papers. Returns title, authors, publication date, abstract url, summary and PDF link for each paper."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords, a title, or author:Name"
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "description": "Maximum number of papers (default 5)"
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
        let max_results = arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(5);

        let url = format!(
            "{}?search_query=all:{}&start=0&max_results={}",
            self.base_url,
            urlencoding::encode(query),
            max_results
        );
        tracing::debug!("arxiv search: {}", url);

        let request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::failed("Operation cancelled")),
            response = request => response.map_err(|e| ToolError::failed(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(format!("arXiv returned {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ToolError::failed(e.to_string()))?;
        let papers = parse_feed(&body)
            .map_err(|e| ToolError::failed(format!("Failed to parse arXiv feed: {}", e)))?;
        Ok(Value::Array(papers))
    }
}
