//! web_search tool - scrape DuckDuckGo's HTML results page
//!
//! Rate-limited to one request per second per process: a shared, mutex-guarded
//! "last call" timestamp enforces a minimum gap regardless of caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::tools::{Tool, ToolResult};

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_RESULTS: usize = 10;

pub struct WebSearchTool {
    http: reqwest::Client,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl WebSearchTool {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; swarmrt/0.1; +web_search tool)")
            .build()
            .unwrap_or_default();
        Self { http, last_call: Arc::new(Mutex::new(None)) }
    }

    async fn throttle(&self) {
        let mut guard = self.last_call.lock().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < MIN_INTERVAL {
                tokio::time::sleep(MIN_INTERVAL - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return a list of result titles, URLs, and snippets."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        debug!(?input, "WebSearchTool::execute: called");
        let query = match input["query"].as_str() {
            Some(q) => q,
            None => return ToolResult::failure("query is required"),
        };

        self.throttle().await;

        let response = match self
            .http
            .get("https://html.duckduckgo.com/html/")
            .query(&[("q", query)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(%e, "WebSearchTool::execute: request failed");
                return ToolResult::failure(format!("search request failed: {}", e));
            }
        };

        if !response.status().is_success() {
            return ToolResult::failure(format!("search returned HTTP {}", response.status()));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::failure(format!("failed to read search response: {}", e)),
        };

        let results = parse_results(&body);
        let json_results: Vec<Value> = results
            .into_iter()
            .take(MAX_RESULTS)
            .map(|r| serde_json::json!({"title": r.title, "url": r.url, "snippet": r.snippet}))
            .collect();

        match serde_json::to_string_pretty(&json_results) {
            Ok(serialized) => ToolResult::ok(serialized),
            Err(e) => ToolResult::failure(format!("failed to serialize search results: {}", e)),
        }
    }
}

struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

/// Minimal scrape of DuckDuckGo's HTML results page: result titles live in
/// `result__a` anchors, snippets in `result__snippet` spans. Best-effort —
/// a markup change degrades to fewer results, not a crash.
fn parse_results(html: &str) -> Vec<SearchResult> {
    let mut results = Vec::new();
    let mut rest = html;
    while let Some(anchor_start) = rest.find("class=\"result__a\"") {
        let after = &rest[anchor_start..];
        let href = after
            .find("href=\"")
            .and_then(|i| after[i + 6..].find('"').map(|j| after[i + 6..i + 6 + j].to_string()))
            .unwrap_or_default();
        let title = after
            .find('>')
            .and_then(|i| after[i + 1..].find("</a>").map(|j| after[i + 1..i + 1 + j].to_string()))
            .unwrap_or_default();

        let snippet = after
            .find("class=\"result__snippet\"")
            .and_then(|s| {
                let tail = &after[s..];
                tail.find('>').and_then(|i| tail[i + 1..].find("</a>").map(|j| tail[i + 1..i + 1 + j].to_string()))
            })
            .unwrap_or_default();

        if !title.is_empty() {
            results.push(SearchResult { title: strip_tags(&title), url: href, snippet: strip_tags(&snippet) });
        }

        rest = &after[18..];
        if results.len() >= MAX_RESULTS {
            break;
        }
    }
    results
}

fn strip_tags(input: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_query_is_rejected() {
        let tool = WebSearchTool::new();
        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
    }

    #[test]
    fn strip_tags_removes_markup() {
        assert_eq!(strip_tags("<b>hello</b> world"), "hello world");
    }

    #[test]
    fn parse_results_extracts_title_and_href() {
        let html = r#"<a class="result__a" href="https://example.com">Example <b>Site</b></a>
            <a class="result__snippet">A short snippet</a>"#;
        let results = parse_results(html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com");
        assert_eq!(results[0].title, "Example Site");
    }
}
