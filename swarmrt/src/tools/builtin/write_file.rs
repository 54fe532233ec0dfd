//! write_file tool - write a UTF-8 string to disk, creating parent dirs

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolResult};

pub struct WriteFileTool;

impl WriteFileTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file, creating parent directories if needed."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file"},
                "content": {"type": "string", "description": "Text content to write"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        debug!(?input, "WriteFileTool::execute: called");
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::failure("path is required"),
        };
        let content = match input["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::failure("content is required"),
        };

        let path_buf = std::path::Path::new(path);
        if let Some(parent) = path_buf.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    debug!(%e, "WriteFileTool::execute: failed to create parent directories");
                    return ToolResult::failure(format!("failed to create directories for {}: {}", path, e));
                }
            }
        }

        match tokio::fs::write(path_buf, content).await {
            Ok(()) => ToolResult::ok(format!("wrote {} bytes to {}", content.len(), path)),
            Err(e) => {
                debug!(%e, "WriteFileTool::execute: write failed");
                ToolResult::failure(format!("failed to write {}: {}", path, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_file_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");

        let tool = WriteFileTool::new();
        let result = tool
            .execute(serde_json::json!({"path": path.to_str().unwrap(), "content": "hi"}))
            .await;
        assert!(result.success);

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "hi");
    }

    #[tokio::test]
    async fn missing_content_is_rejected() {
        let tool = WriteFileTool::new();
        let result = tool.execute(serde_json::json!({"path": "x.txt"})).await;
        assert!(!result.success);
    }
}
