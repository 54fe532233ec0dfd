//! run_command tool - execute a shell command with a timeout

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolResult};

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_OUTPUT_CHARS: usize = 30_000;

pub struct RunCommandTool;

impl RunCommandTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its combined stdout/stderr."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to execute"},
                "timeout_ms": {"type": "integer", "description": "Timeout in milliseconds (default: 120000)"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        debug!(?input, "RunCommandTool::execute: called");
        let command = match input["command"].as_str() {
            Some(c) => c,
            None => return ToolResult::failure("command is required"),
        };
        let timeout_ms = input["timeout_ms"].as_u64().unwrap_or(DEFAULT_TIMEOUT_MS);

        let output = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::process::Command::new("sh").arg("-c").arg(command).output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(%e, "RunCommandTool::execute: failed to spawn command");
                return ToolResult::failure(format!("failed to execute command: {}", e));
            }
            Err(_) => {
                debug!(%timeout_ms, "RunCommandTool::execute: command timed out");
                return ToolResult::failure(format!("command timed out after {}ms", timeout_ms));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = if stdout.is_empty() && !stderr.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n\nSTDERR:\n{}", stdout, stderr)
        };

        let truncated = if combined.len() > MAX_OUTPUT_CHARS {
            format!("{}...\n[truncated, {} chars total]", &combined[..MAX_OUTPUT_CHARS], combined.len())
        } else {
            combined
        };

        if output.status.success() {
            ToolResult::ok(truncated)
        } else {
            ToolResult::failure(format!("exit code {}\n{}", output.status.code().unwrap_or(-1), truncated))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let tool = RunCommandTool::new();
        let result = tool.execute(serde_json::json!({"command": "echo hello"})).await;
        assert!(result.success);
        assert_eq!(result.output.trim(), "hello");
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let tool = RunCommandTool::new();
        let result = tool.execute(serde_json::json!({"command": "exit 3"})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("exit code 3"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let tool = RunCommandTool::new();
        let result = tool.execute(serde_json::json!({"command": "sleep 5", "timeout_ms": 50})).await;
        assert!(!result.success);
    }
}
