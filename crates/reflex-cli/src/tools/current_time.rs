//! Current time tool

use async_trait::async_trait;
use reflex_agent::{Tool, ToolError};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Reports the local wall-clock time
#[derive(Debug, Default)]
pub struct CurrentTimeTool;

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current local time (HH:MM:SS), today's date and the UTC timestamp."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _arguments: Value,
        _cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        let now = chrono::Local::now();
        Ok(json!({
            "time": now.format("%H:%M:%S").to_string(),
            "date": now.format("%Y-%m-%d").to_string(),
            "utc": chrono::Utc::now().to_rfc3339(),
        }))
    }
}
