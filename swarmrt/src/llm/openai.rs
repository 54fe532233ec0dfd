//! OpenAI-shaped provider adapter.
//!
//! Retry policy: transient errors (timeouts, 5xx) retried with exponential
//! backoff (1s -> 10s, three attempts); 429 is retried honoring
//! `Retry-After` instead of the backoff schedule; anything else is not
//! retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::LlmError;

use super::client::LlmClient;
use super::pricing::{calculate_cost, estimate_tokens};
use super::types::{CompletionRequest, CompletionResponse, Message, StopReason, TokenUsage, ToolCall};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

pub struct OpenAIClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client build should not fail with static config");
        Self { api_key, http, base_url: "https://api.openai.com/v1".to_string() }
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        debug!(model = %request.model, "OpenAIClient::build_request_body: called");
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": request.system_prompt}));
        }
        for m in &request.messages {
            messages.push(convert_message(m));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
        });

        // gpt-5/o1/o3 reject max_tokens in favor of max_completion_tokens.
        let key = if request.model.starts_with("o1") || request.model.starts_with("o3") || request.model.starts_with("gpt-5") {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        body[key] = json!(request.max_tokens);

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    fn is_retryable_status(status: u16) -> bool {
        matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
    }

    fn parse_response(&self, request: &CompletionRequest, body: ChatCompletionResponse) -> Result<CompletionResponse, LlmError> {
        let model = request.model.as_str();
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments: Value = serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
                ToolCall { id: tc.id, name: tc.function.name, arguments }
            })
            .collect();

        let content = choice.message.content.clone().unwrap_or_default();

        let usage = match body.usage {
            Some(u) => TokenUsage { prompt_tokens: u.prompt_tokens, completion_tokens: u.completion_tokens, total_tokens: u.total_tokens },
            None => {
                let prompt_text: String = request.messages.iter().map(message_text).collect::<Vec<_>>().join("\n");
                let prompt_tokens = estimate_tokens(&prompt_text) + estimate_tokens(&request.system_prompt);
                let completion_tokens = estimate_tokens(&content);
                TokenUsage { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens }
            }
        };

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => StopReason::Stop,
            Some("length") => StopReason::Length,
            Some("tool_calls") => StopReason::ToolCalls,
            Some(other) => StopReason::Other(other.to_string()),
            None => StopReason::Other("unknown".to_string()),
        };

        Ok(CompletionResponse {
            content,
            tool_calls,
            cost: calculate_cost(model, usage),
            usage,
            model: model.to_string(),
            finish_reason,
        })
    }
}

/// Flat text extracted from a neutral message, for the char-count token
/// estimate fallback only (never sent over the wire in this form).
fn message_text(message: &Message) -> &str {
    match message {
        Message::System { content } => content,
        Message::User { content } => content,
        Message::Assistant { content, .. } => content,
        Message::Tool { content, .. } => content,
    }
}

fn convert_message(message: &Message) -> Value {
    match message {
        Message::System { content } => json!({"role": "system", "content": content}),
        Message::User { content } => json!({"role": "user", "content": content}),
        Message::Assistant { content, tool_calls } => {
            if tool_calls.is_empty() {
                json!({"role": "assistant", "content": content})
            } else {
                let calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {"name": tc.name, "arguments": tc.arguments.to_string()}
                        })
                    })
                    .collect();
                json!({"role": "assistant", "content": content, "tool_calls": calls})
            }
        }
        Message::Tool { call_id, content } => json!({"role": "tool", "tool_call_id": call_id, "content": content}),
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %request.model, "OpenAIClient::complete: called");
        let body = self.build_request_body(&request);
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if e.is_timeout() && attempt < MAX_RETRIES => {
                    debug!(attempt, "OpenAIClient::complete: timeout, retrying");
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
                debug!(attempt, status, "OpenAIClient::complete: retryable status, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::Provider { status, message });
            }

            let parsed: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            return self.parse_response(&request, parsed);
        }

        Err(LlmError::Timeout)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<RawToolCall>>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    id: String,
    function: RawFunctionCall,
}

#[derive(Debug, Deserialize)]
struct RawFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ToolDefinition;

    fn client() -> OpenAIClient {
        OpenAIClient::new("test-key".to_string(), 30)
    }

    #[test]
    fn build_request_body_basic() {
        let request = CompletionRequest {
            model: "gpt-4".to_string(),
            system_prompt: "be terse".to_string(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: 100,
            temperature: 0.5,
        };
        let body = client().build_request_body(&request);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn max_tokens_key_switches_for_o1() {
        let request = CompletionRequest {
            model: "o1-preview".to_string(),
            system_prompt: String::new(),
            messages: vec![],
            tools: vec![],
            max_tokens: 500,
            temperature: 1.0,
        };
        let body = client().build_request_body(&request);
        assert_eq!(body["max_completion_tokens"], 500);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn tools_are_attached_when_present() {
        let request = CompletionRequest {
            model: "gpt-4".to_string(),
            system_prompt: String::new(),
            messages: vec![],
            tools: vec![ToolDefinition {
                name: "search".to_string(),
                description: "search the web".to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
            }],
            max_tokens: 100,
            temperature: 0.0,
        };
        let body = client().build_request_body(&request);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "search");
    }

    #[test]
    fn is_retryable_status_matches_spec_set() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(OpenAIClient::is_retryable_status(status));
        }
        assert!(!OpenAIClient::is_retryable_status(400));
        assert!(!OpenAIClient::is_retryable_status(404));
    }
}
