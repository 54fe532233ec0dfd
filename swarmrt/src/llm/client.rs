//! The provider-agnostic LLM client seam.

use async_trait::async_trait;

use crate::error::LlmError;

use super::types::{CompletionRequest, CompletionResponse};

/// A provider adapter. Every call takes a full `CompletionRequest` — the
/// Agent's reasoning loop maintains message history itself and resends it
/// each iteration; the adapter is stateless.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
