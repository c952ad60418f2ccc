//! File writing tool

use async_trait::async_trait;
use reflex_agent::{Tool, ToolError};
use serde_json::{Value, json};
use std::path::PathBuf;
use tokio::fs;
use tokio_util::sync::CancellationToken;

/// Writes text to a file, creating parent directories
#[derive(Debug, Default)]
pub struct WriteTextFileTool;

impl WriteTextFileTool {
    pub fn new() -> Self {
        Self
    }
}

/// Expand a leading `~/` to the home directory
fn resolve_path(path: &str) -> Result<PathBuf, ToolError> {
    if path.trim().is_empty() {
        return Err(ToolError::InvalidArguments("'path' is empty".into()));
    }
    if path == "~" {
        return Err(ToolError::failed("Cannot write to home directory itself"));
    }
    Ok(match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(stripped), Some(home)) => home.join(stripped),
        _ => PathBuf::from(path),
    })
}

#[async_trait]
impl Tool for WriteTextFileTool {
    fn name(&self) -> &str {
        "write_text_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file. Creates the file if it doesn't exist, overwrites if it does. Automatically creates parent directories."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to write (relative or absolute)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(
        &self,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        let path_str = arguments
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing 'file_path'".into()))?;
        let content = arguments
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing 'content'".into()))?;

        let path = resolve_path(path_str)?;

        if cancel.is_cancelled() {
            return Err(ToolError::failed("Operation cancelled"));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::failed(format!("Failed to create directory: {}", e)))?;
        }

        fs::write(&path, content)
            .await
            .map_err(|e| ToolError::failed(format!("Failed to write file: {}", e)))?;

        Ok(json!({
            "path": path.display().to_string(),
            "bytes": content.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes/summary.txt");

        let out = WriteTextFileTool::new()
            .execute(
                json!({"file_path": path.to_str().unwrap(), "content": "hello"}),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(out["bytes"], 5);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_missing_content_is_rejected() {
        let err = WriteTextFileTool::new()
            .execute(json!({"file_path": "x.txt"}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.txt");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = WriteTextFileTool::new()
            .execute(json!({"file_path": path.to_str().unwrap(), "content": "x"}), cancel)
            .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
