//! Neutral message/response shapes shared by every provider adapter.
//!
//! Per the design notes: `Message` is a tagged-variant discipline rather
//! than a duck-typed provider-specific shape. Provider adapters normalize
//! to this shape immediately after parsing a response; nothing upstream of
//! an adapter boundary ever sees a provider-native shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A role tag, used by provider adapters when flattening `Message` into
/// their own wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn in the conversation, in the runtime's neutral shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant { content: String, tool_calls: Vec<ToolCall> },
    Tool { call_id: String, content: String },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant { content: content.into(), tool_calls }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool { call_id: call_id.into(), content: content.into() }
    }
}

/// A block of multi-part content, used when flattening neutral messages to
/// providers (such as Anthropic) that model content as a list of typed
/// blocks rather than a single string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

/// Alternate content representation some provider payloads require: either
/// a flat string or a list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A tool the model invoked, with an opaque structured argument value
/// (nested map + list of primitives) rather than a provider-typed shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool's schema, as emitted by `Agent`'s tools-schema step. The adapter
/// is responsible for translating this to provider-native form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolCalls,
    ToolUse,
    EndTurn,
    Other(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completion request in neutral shape.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A completion response, fully normalized to the neutral shape.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    pub model: String,
    pub cost: f64,
    pub finish_reason: StopReason,
}

/// A chunk of a streamed response.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    ContentDelta(String),
    ToolCallDelta(ToolCall),
    Done { usage: TokenUsage, finish_reason: StopReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_the_right_role() {
        assert!(matches!(Message::system("hi"), Message::System { .. }));
        assert!(matches!(Message::user("hi"), Message::User { .. }));
        assert!(matches!(Message::tool("1", "ok"), Message::Tool { .. }));
    }
}
