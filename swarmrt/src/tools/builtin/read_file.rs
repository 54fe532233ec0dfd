//! read_file tool - read a UTF-8 file from disk, capped at a byte budget

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolResult};

const MAX_BYTES: usize = 200_000;

pub struct ReadFileTool;

impl ReadFileTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from disk."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        debug!(?input, "ReadFileTool::execute: called");
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::failure("path is required"),
        };

        let contents = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(%e, "ReadFileTool::execute: read failed");
                return ToolResult::failure(format!("failed to read {}: {}", path, e));
            }
        };

        let text = String::from_utf8_lossy(&contents);
        if text.len() > MAX_BYTES {
            debug!(len = text.len(), "ReadFileTool::execute: truncating long file");
            let truncated: String = text.chars().take(MAX_BYTES).collect();
            ToolResult::ok(format!("{}...\n[truncated, {} bytes total]", truncated, text.len()))
        } else {
            ToolResult::ok(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_path_is_rejected() {
        let tool = ReadFileTool::new();
        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn reads_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        let tool = ReadFileTool::new();
        let result = tool.execute(serde_json::json!({"path": path.to_str().unwrap()})).await;
        assert!(result.success);
        assert_eq!(result.output, "hello world");
    }

    #[tokio::test]
    async fn nonexistent_path_fails() {
        let tool = ReadFileTool::new();
        let result = tool.execute(serde_json::json!({"path": "/nonexistent/path/abc"})).await;
        assert!(!result.success);
    }
}
