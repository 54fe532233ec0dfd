//! LLM client module: neutral message/response shapes, provider dispatch,
//! cost accounting.

mod anthropic;
pub mod client;
mod openai;
pub mod pricing;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use openai::OpenAIClient;
pub use pricing::calculate_cost;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, StreamChunk,
    TokenUsage, ToolCall, ToolDefinition,
};

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create an LLM client for the given model, dispatching by name prefix.
///
/// Family-based dispatch: names starting with "gpt" or "o1"/"o3" route to
/// the OpenAI-shaped adapter, "claude" routes to the Anthropic-shaped
/// adapter. Unknown prefixes are a configuration error.
pub fn create_client(model: &str, config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    tracing::debug!(model, "create_client: called");
    if model.starts_with("gpt") || model.starts_with("o1") || model.starts_with("o3") {
        let api_key = std::env::var(&config.openai_api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("missing env var {}", config.openai_api_key_env)))?;
        return Ok(Arc::new(OpenAIClient::new(api_key, config.timeout_secs)));
    }
    if model.starts_with("claude") {
        let api_key = std::env::var(&config.anthropic_api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("missing env var {}", config.anthropic_api_key_env)))?;
        return Ok(Arc::new(AnthropicClient::new(api_key, config.timeout_secs)));
    }
    Err(LlmError::InvalidResponse(format!(
        "unknown model family for '{}'. Supported prefixes: gpt, o1, o3, claude",
        model
    )))
}
