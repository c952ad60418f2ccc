//! Biomedical literature search through the Europe PMC REST API

use async_trait::async_trait;
use reflex_agent::{Tool, ToolError};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
const ABSTRACT_CHARS: usize = 500;

/// Search PubMed, PMC and preprint servers
pub struct EuropePmcSearchTool {
    client: reqwest::Client,
    base_url: String,
}

impl EuropePmcSearchTool {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for EuropePmcSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

fn field<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn parse_results(body: &Value) -> Vec<Value> {
    let Some(items) = body.pointer("/resultList/result").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| {
            let source = field(item, "source");
            let abstract_text = match item.get("abstractText").and_then(Value::as_str) {
                Some(text) => {
                    let short: String = text.chars().take(ABSTRACT_CHARS).collect();
                    format!("{}...", short)
                }
                None => "No abstract available.".to_string(),
            };
            json!({
                "title": field(item, "title"),
                "authors": field(item, "authorString"),
                "journal": field(item, "journalTitle"),
                "pub_year": field(item, "pubYear"),
                "source": source,
                "url": format!("https://europepmc.org/article/{}/{}", source, field(item, "id")),
                "abstract": abstract_text,
            })
        })
        .collect()
}

#[async_trait]
impl Tool for EuropePmcSearchTool {
    fn name(&self) -> &str {
        "europe_pmc_search"
    }

    fn description(&self) -> &str {
        "Search Europe PMC for life-science and biomedical literature, including PubMed and preprints. Returns title, authors, journal, year, source, url and a shortened abstract."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords, disease or drug names, or author:Name"
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
        let page_size = arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(5)
            .to_string();

        tracing::debug!("europe pmc search: {}", query);

        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("query", query),
                ("format", "json"),
                ("pageSize", page_size.as_str()),
                ("resultType", "core"),
            ])
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::failed("Operation cancelled")),
            response = request => response.map_err(|e| ToolError::failed(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(format!("Europe PMC returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("Invalid Europe PMC response: {}", e)))?;
        Ok(Value::Array(parse_results(&body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results() {
        let long_abstract = "mRNA ".repeat(200);
        let body = json!({
            "hitCount": 2,
            "resultList": {"result": [
                {
                    "id": "38000001",
                    "source": "MED",
                    "title": "Efficacy of mRNA vaccines",
                    "authorString": "Doe J, Roe R.",
                    "journalTitle": "Nat Med",
                    "pubYear": "2024",
                    "abstractText": long_abstract
                },
                {"id": "PPR123", "source": "PPR", "title": "A preprint"}
            ]}
        });

        let results = parse_results(&body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["url"], "https://europepmc.org/article/MED/38000001");
        assert_eq!(results[0]["journal"], "Nat Med");
        assert_eq!(
            results[0]["abstract"].as_str().unwrap().chars().count(),
            ABSTRACT_CHARS + 3
        );
        assert_eq!(results[1]["abstract"], "No abstract available.");
        assert_eq!(results[1]["pub_year"], "");
    }

    #[test]
    fn test_empty_result_list() {
        assert!(parse_results(&json!({"hitCount": 0})).is_empty());
    }
}
