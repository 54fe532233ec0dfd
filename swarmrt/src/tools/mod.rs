//! Tool framework: a trait every capability implements, and a registry the
//! agent loop resolves tool calls against by name.

pub mod builtin;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::ToolError;
use crate::llm::ToolDefinition;

/// Outcome of one tool invocation. Never propagated as a Rust error to the
/// agent loop: a failed tool call becomes a `Tool` message the model can
/// react to, not a terminated run.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self { success: false, output: String::new(), error: Some(error) }
    }
}

/// A capability an agent can invoke mid-reasoning-loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, arguments: Value) -> ToolResult;
}

/// Name-keyed registry of tools, resolved at agent construction time.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// The built-in tool set, as shipped. Panics on a name collision among
    /// the built-ins themselves, which would be a programming error.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(builtin::WebSearchTool::new())).expect("built-in tool names are unique");
        registry.register(Box::new(builtin::ReadFileTool::new())).expect("built-in tool names are unique");
        registry.register(Box::new(builtin::WriteFileTool::new())).expect("built-in tool names are unique");
        registry.register(Box::new(builtin::RunCommandTool::new())).expect("built-in tool names are unique");
        registry.register(Box::new(builtin::HttpRequestTool::new())).expect("built-in tool names are unique");
        registry.register(Box::new(builtin::CalculateTool::new())).expect("built-in tool names are unique");
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        debug!(tool = %name, "ToolRegistry::register: called");
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateRegistration(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Tool definitions for the given names, silently skipping any name not
    /// registered (the agent loop logs and surfaces that as a tool-call
    /// error instead of failing the whole request).
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        debug!(tool = %name, "ToolRegistry::execute: called");
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        Ok(tool.execute(arguments).await)
    }
}
