//! Agent reasoning loop: `LLM -> (tool calls?) -> tools -> LLM ...` until a
//! natural stop, a detector trips, or the iteration cap is reached.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::detect::{CostPerInsightTracker, InsightRecord, LoopDetectionResult, LoopDetector, jaccard_similarity};
use crate::llm::{CompletionRequest, LlmClient, Message, ToolDefinition};
use crate::routing::ModelRouter;
use crate::tools::ToolRegistry;

/// Immutable agent configuration, attached to a task once and not mutated.
///
/// Deserializable so a task's inline `agent_config` can be parsed straight
/// off the queue payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_temperature() -> f32 {
    0.7
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            system_prompt: String::new(),
            tools: Vec::new(),
            max_iterations: 10,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
}

/// Per-execution metrics, reset on each `run`.
#[derive(Debug, Clone)]
pub struct AgentMetrics {
    pub tokens_used: u32,
    pub cost_dollars: f64,
    pub iterations: u32,
    pub tool_calls: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    fn start() -> Self {
        Self { tokens_used: 0, cost_dollars: 0.0, iterations: 0, tool_calls: 0, start_time: Utc::now(), end_time: None }
    }

    pub fn duration_ms(&self) -> i64 {
        match self.end_time {
            Some(end) => (end - self.start_time).num_milliseconds(),
            None => 0,
        }
    }
}

/// One task's instruction plus its context/parameter bags.
#[derive(Debug, Clone, Default)]
pub struct TaskInput {
    pub instruction: String,
    pub context: HashMap<String, Value>,
    pub parameters: HashMap<String, Value>,
}

/// Outcome of one `Agent::run`.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub result: String,
    pub data: Value,
    pub metrics: AgentMetrics,
}

fn status_from_u8(v: u8) -> AgentStatus {
    match v {
        1 => AgentStatus::Busy,
        2 => AgentStatus::Error,
        _ => AgentStatus::Idle,
    }
}

fn status_to_u8(s: AgentStatus) -> u8 {
    match s {
        AgentStatus::Idle => 0,
        AgentStatus::Busy => 1,
        AgentStatus::Error => 2,
    }
}

/// A named configuration plus state that drives one LLM-tool reasoning
/// loop. Borrows the LLM adapter and tool registry, both shared read-only
/// w.r.t. structure.
pub struct Agent {
    pub config: AgentConfig,
    llm: Arc<dyn LlmClient>,
    router: Option<Arc<ModelRouter>>,
    tools: Arc<ToolRegistry>,
    status: AtomicU8,
}

impl Agent {
    pub fn new(config: AgentConfig, llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Self {
        Self { config, llm, router: None, tools, status: AtomicU8::new(status_to_u8(AgentStatus::Idle)) }
    }

    pub fn with_router(mut self, router: Arc<ModelRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn status(&self) -> AgentStatus {
        status_from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: AgentStatus) {
        self.status.store(status_to_u8(status), Ordering::SeqCst);
    }

    fn build_initial_messages(&self, task: &TaskInput) -> Vec<Message> {
        if task.context.is_empty() {
            vec![Message::user(task.instruction.clone())]
        } else {
            let mut lines = Vec::new();
            for (k, v) in &task.context {
                lines.push(format!("- {}: {}", k, v));
            }
            let content = format!("Context:\n{}\n\nTask: {}", lines.join("\n"), task.instruction);
            vec![Message::user(content)]
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions_for(&self.config.tools)
    }

    /// Execute one task's reasoning loop to completion.
    pub async fn run(&self, task: &TaskInput, trace_id: Option<&str>) -> Result<TaskOutput> {
        self.set_status(AgentStatus::Busy);
        let mut metrics = AgentMetrics::start();
        let result = self.run_inner(task, trace_id, &mut metrics).await;

        metrics.end_time = Some(Utc::now());
        match result {
            Ok((text, data)) => {
                self.set_status(AgentStatus::Idle);
                Ok(TaskOutput { result: text, data, metrics })
            }
            Err(e) => {
                self.set_status(AgentStatus::Error);
                Err(e)
            }
        }
    }

    async fn run_inner(&self, task: &TaskInput, trace_id: Option<&str>, metrics: &mut AgentMetrics) -> Result<(String, Value)> {
        debug!(agent = %self.config.name, ?trace_id, "Agent::run: called");
        let mut messages = self.build_initial_messages(task);
        let tool_defs = self.tool_definitions();
        let tools_offered = !tool_defs.is_empty();

        let mut loop_detector = LoopDetector::default();
        let mut cost_tracker = CostPerInsightTracker::default();
        let mut previous_outputs: Vec<String> = Vec::new();

        for iteration in 0..self.config.max_iterations {
            metrics.iterations = iteration + 1;

            let request = CompletionRequest {
                model: self.config.model.clone(),
                system_prompt: self.config.system_prompt.clone(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                max_tokens: 4096,
                temperature: self.config.temperature,
            };

            let response = if let Some(router) = &self.router {
                let llm = self.llm.clone();
                let routed = router
                    .route(move |_model| Ok(llm.clone()), request)
                    .await
                    .map_err(|e| eyre!("llm call failed: {e}"))?;
                metrics.cost_dollars += routed.total_cost;
                routed.response
            } else {
                let response = self.llm.complete(request).await.map_err(|e| eyre!("llm call failed: {e}"))?;
                metrics.cost_dollars += response.cost;
                response
            };
            metrics.tokens_used += response.usage.total_tokens;

            // Loop check.
            if let LoopDetectionResult::Loop { loop_type, confidence, suggestion } = loop_detector.check(&response.content) {
                info!(agent = %self.config.name, ?loop_type, confidence, "Agent::run: loop detected, terminating");
                return Ok((
                    format!("Agent terminated: {}", suggestion),
                    json!({
                        "error": "loop_detected",
                        "loop_type": format!("{:?}", loop_type),
                        "confidence": confidence,
                        "iteration": iteration,
                    }),
                ));
            }

            // Cost/insight check.
            let output_novelty = if previous_outputs.is_empty() {
                1.0
            } else if response.content.split_whitespace().next().is_none() {
                0.0
            } else {
                let max_sim = previous_outputs
                    .iter()
                    .map(|prev| jaccard_similarity(&response.content, prev))
                    .fold(0.0_f64, f64::max);
                1.0 - max_sim
            };
            previous_outputs.push(response.content.clone());

            let state_changed = !response.tool_calls.is_empty();
            cost_tracker.record(InsightRecord {
                tokens_used: response.usage.total_tokens,
                cost: response.cost,
                state_changed,
                output_novelty,
                timestamp: iteration as u64,
            });

            if let Some(reason) = cost_tracker.should_terminate() {
                let efficiency_score = cost_tracker.efficiency_score();
                warn!(agent = %self.config.name, %reason, "Agent::run: diminishing returns, terminating");
                return Ok((
                    format!("Agent terminated due to diminishing returns: {}", reason),
                    json!({
                        "error": "diminishing_returns",
                        "reason": reason,
                        "iteration": iteration,
                        "efficiency_score": efficiency_score,
                    }),
                ));
            }

            // Natural completion.
            if response.tool_calls.is_empty() {
                return Ok((response.content, json!({})));
            }

            // Tool execution.
            messages.push(Message::assistant(response.content.clone(), response.tool_calls.clone()));
            for call in &response.tool_calls {
                metrics.tool_calls += 1;
                let content = if !self.tools.has(&call.name) {
                    format!("Error: Tool not found: {}", call.name)
                } else {
                    match self.tools.execute(&call.name, call.arguments.clone()).await {
                        Ok(output) if output.success => output.output,
                        Ok(output) => format!("Error: {}", output.error.unwrap_or_default()),
                        Err(e) => format!("Error: {}", e),
                    }
                };
                messages.push(Message::tool(call.id.clone(), content));
            }
        }

        Ok((
            "Max iterations reached without completing the task.".to_string(),
            json!({"error": "max_iterations_exceeded"}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage, ToolCall};
    use crate::tools::ToolRegistry;

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::empty())
    }

    #[tokio::test]
    async fn simple_success_returns_content_on_first_iteration() {
        let llm = Arc::new(MockLlmClient::new(vec![CompletionResponse {
            content: "Hi".to_string(),
            tool_calls: vec![],
            usage: TokenUsage { prompt_tokens: 50, completion_tokens: 20, total_tokens: 70 },
            model: "gpt-3.5-turbo".to_string(),
            cost: 0.001,
            finish_reason: StopReason::Stop,
        }]));

        let config = AgentConfig::new("default", "gpt-3.5-turbo");
        let agent = Agent::new(config, llm, registry());
        let task = TaskInput { instruction: "Say hello".to_string(), ..Default::default() };

        let output = agent.run(&task, None).await.unwrap();
        assert_eq!(output.result, "Hi");
        assert_eq!(output.metrics.iterations, 1);
        assert_eq!(output.metrics.tokens_used, 70);
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn max_iterations_exceeded_with_tool_calls() {
        // B2: max_iterations=1 and a tool-call response -> max_iterations_exceeded.
        let llm = Arc::new(MockLlmClient::new(vec![CompletionResponse {
            content: "still working".to_string(),
            tool_calls: vec![ToolCall { id: "1".into(), name: "search".into(), arguments: json!({}) }],
            usage: TokenUsage::default(),
            model: "gpt-3.5-turbo".to_string(),
            cost: 0.0,
            finish_reason: StopReason::ToolCalls,
        }]));

        let mut config = AgentConfig::new("default", "gpt-3.5-turbo");
        config.max_iterations = 1;
        config.tools = vec!["search".to_string()];
        let agent = Agent::new(config, llm, registry());
        let task = TaskInput { instruction: "do something".to_string(), ..Default::default() };

        let output = agent.run(&task, None).await.unwrap();
        assert_eq!(output.data["error"], "max_iterations_exceeded");
        assert_eq!(output.metrics.iterations, 1);
    }

    #[tokio::test]
    async fn loop_detection_terminates_before_max_iterations() {
        let identical = CompletionResponse {
            content: "Let me search.".to_string(),
            tool_calls: vec![ToolCall { id: "1".into(), name: "search".into(), arguments: json!({}) }],
            usage: TokenUsage::default(),
            model: "gpt-3.5-turbo".to_string(),
            cost: 0.0,
            finish_reason: StopReason::ToolCalls,
        };
        let llm = Arc::new(MockLlmClient::new(vec![identical.clone(), identical.clone(), identical.clone(), identical]));

        let mut config = AgentConfig::new("default", "gpt-3.5-turbo");
        config.max_iterations = 10;
        config.tools = vec!["search".to_string()];
        let agent = Agent::new(config, llm, registry());
        let task = TaskInput { instruction: "do something".to_string(), ..Default::default() };

        let output = agent.run(&task, None).await.unwrap();
        assert_eq!(output.data["error"], "loop_detected");
        assert!(output.metrics.iterations < 10);
    }
}
