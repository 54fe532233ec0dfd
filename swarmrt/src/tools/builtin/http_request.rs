//! http_request tool - issue a GET/POST/PUT/DELETE and return the body

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolResult};

const MAX_BODY_CHARS: usize = 30_000;

pub struct HttpRequestTool {
    http: reqwest::Client,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("swarmrt/0.1 (http_request tool)")
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Issue an HTTP request (GET, POST, PUT, or DELETE) and return the response body."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "method": {"type": "string", "description": "GET, POST, PUT, or DELETE (default: GET)"},
                "url": {"type": "string", "description": "URL to request"},
                "body": {"type": "string", "description": "Optional request body"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        debug!(?input, "HttpRequestTool::execute: called");
        let url = match input["url"].as_str() {
            Some(u) => u,
            None => return ToolResult::failure("url is required"),
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::failure("url must start with http:// or https://");
        }

        let method = input["method"].as_str().unwrap_or("GET").to_uppercase();
        let mut builder = match method.as_str() {
            "GET" => self.http.get(url),
            "POST" => self.http.post(url),
            "PUT" => self.http.put(url),
            "DELETE" => self.http.delete(url),
            other => return ToolResult::failure(format!("unsupported method: {}", other)),
        };

        if let Some(body) = input["body"].as_str() {
            builder = builder.body(body.to_string());
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(%e, "HttpRequestTool::execute: request failed");
                return ToolResult::failure(format!("request failed: {}", e));
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let truncated = if text.len() > MAX_BODY_CHARS {
            format!("{}...\n[truncated, {} chars total]", &text[..MAX_BODY_CHARS], text.len())
        } else {
            text
        };

        if status.is_success() {
            ToolResult::ok(truncated)
        } else {
            ToolResult::failure(format!("HTTP {}: {}", status.as_u16(), truncated))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_url_is_rejected() {
        let tool = HttpRequestTool::new();
        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let tool = HttpRequestTool::new();
        let result = tool.execute(serde_json::json!({"url": "ftp://example.com"})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn rejects_unsupported_method() {
        let tool = HttpRequestTool::new();
        let result = tool.execute(serde_json::json!({"url": "https://example.com", "method": "PATCH"})).await;
        assert!(!result.success);
    }
}
