//! Anthropic-shaped provider adapter.
//!
//! Same retry policy as [`super::openai::OpenAIClient`]; differs in wire
//! shape: the system prompt is a top-level field rather than a message,
//! and tool calls are content blocks rather than a separate array.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::LlmError;

use super::client::LlmClient;
use super::pricing::calculate_cost;
use super::types::{CompletionRequest, CompletionResponse, Message, StopReason, TokenUsage, ToolCall};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

pub struct AnthropicClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client build should not fail with static config");
        Self { api_key, http, base_url: "https://api.anthropic.com/v1".to_string() }
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        debug!(model = %request.model, "AnthropicClient::build_request_body: called");
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| !matches!(m, Message::System { .. }))
            .map(convert_message)
            .collect();

        let mut body = json!({
            "model": request.model,
            "system": request.system_prompt,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| json!({"name": t.name, "description": t.description, "input_schema": t.input_schema}))
                .collect();
            body["tools"] = json!(tools);
        }

        body
    }

    fn is_retryable_status(status: u16) -> bool {
        matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
    }
}

fn convert_message(message: &Message) -> Value {
    match message {
        Message::System { content } => json!({"role": "user", "content": content}),
        Message::User { content } => json!({"role": "user", "content": content}),
        Message::Assistant { content, tool_calls } => {
            if tool_calls.is_empty() {
                json!({"role": "assistant", "content": content})
            } else {
                let mut blocks = vec![json!({"type": "text", "text": content})];
                for tc in tool_calls {
                    blocks.push(json!({"type": "tool_use", "id": tc.id, "name": tc.name, "input": tc.arguments}));
                }
                json!({"role": "assistant", "content": blocks})
            }
        }
        Message::Tool { call_id, content } => json!({
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": call_id, "content": content}]
        }),
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %request.model, "AnthropicClient::complete: called");
        let body = self.build_request_body(&request);
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .http
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if e.is_timeout() && attempt < MAX_RETRIES => {
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(10_000);
                    continue;
                }
                Err(e) => return Err(LlmError::Transport(e.to_string())),
            };

            let status = response.status().as_u16();
            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(LlmError::RateLimited { retry_after_secs: retry_after });
            }

            if Self::is_retryable_status(status) && attempt < MAX_RETRIES {
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::Provider { status, message });
            }

            let parsed: MessagesResponse =
                response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

            let mut content = String::new();
            let mut tool_calls = Vec::new();
            for block in parsed.content {
                match block {
                    RawContentBlock::Text { text } => content.push_str(&text),
                    RawContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall { id, name, arguments: input }),
                }
            }

            let usage = TokenUsage {
                prompt_tokens: parsed.usage.input_tokens,
                completion_tokens: parsed.usage.output_tokens,
                total_tokens: parsed.usage.input_tokens + parsed.usage.output_tokens,
            };

            let finish_reason = match parsed.stop_reason.as_deref() {
                Some("end_turn") => StopReason::EndTurn,
                Some("tool_use") => StopReason::ToolUse,
                Some("max_tokens") => StopReason::Length,
                Some(other) => StopReason::Other(other.to_string()),
                None => StopReason::Other("unknown".to_string()),
            };

            return Ok(CompletionResponse {
                content,
                tool_calls,
                cost: calculate_cost(&request.model, usage),
                usage,
                model: request.model.clone(),
                finish_reason,
            });
        }

        Err(LlmError::Timeout)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<RawContentBlock>,
    usage: RawUsage,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::new("test-key".to_string(), 30)
    }

    #[test]
    fn system_prompt_is_top_level_not_a_message() {
        let request = CompletionRequest {
            model: "claude-3-sonnet".to_string(),
            system_prompt: "be terse".to_string(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: 100,
            temperature: 0.5,
        };
        let body = client().build_request_body(&request);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn assistant_tool_calls_become_content_blocks() {
        let request = CompletionRequest {
            model: "claude-3-sonnet".to_string(),
            system_prompt: String::new(),
            messages: vec![Message::assistant(
                "let me check",
                vec![ToolCall { id: "1".into(), name: "search".into(), arguments: json!({"q": "x"}) }],
            )],
            tools: vec![],
            max_tokens: 100,
            temperature: 0.0,
        };
        let body = client().build_request_body(&request);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "tool_use");
    }
}
