//! Error kinds the runtime distinguishes.
//!
//! Each seam gets its own enum (matching the reference crate's split of
//! `LlmError`/`ToolError`/`StateError`/...) rather than one crate-wide
//! error, so callers can match on the kind the design calls for.

use thiserror::Error;

/// Fatal-at-startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: serde_yaml::Error },

    #[error("no LLM provider credentials configured (set one of: {0})")]
    MissingCredentials(String),

    #[error("invalid cascade: {0}")]
    InvalidCascade(String),

    #[error("{field} must be in range {min}..{max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
}

/// Transient or provider-side LLM failures.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider HTTP error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("request timed out")]
    Timeout,

    #[error("malformed response from provider: {0}")]
    InvalidResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Tool execution failures. Always captured, never propagated into the
/// reasoning loop — see `ToolResult`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("duplicate tool registration: {0}")]
    DuplicateRegistration(String),

    #[error("{0}")]
    Execution(String),
}

/// AgentExecutor-level errors.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("task timed out after {0}s")]
    TaskTimeout(u64),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("agent execution failed: {0}")]
    AgentFailed(String),
}

/// Key-value bus transport errors.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation failed: {0}")]
    Operation(String),
}

impl From<redis::RedisError> for KvError {
    fn from(e: redis::RedisError) -> Self {
        KvError::Operation(e.to_string())
    }
}

/// CNP bidding errors.
#[derive(Debug, Error)]
pub enum BiddingError {
    #[error("kv bus error: {0}")]
    Kv(#[from] KvError),

    #[error("malformed payload: {0}")]
    Malformed(String),
}
