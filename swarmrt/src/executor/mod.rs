//! AgentExecutor: task intake, concurrency enforcement, agent selection,
//! execution with timeout, result reporting, retry policy.
//!
//! The concurrency limit is enforced solely by the semaphore acquired in
//! `pull_and_execute`; there is deliberately no secondary map of in-flight
//! tasks tracking the same thing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, AgentConfig, TaskInput};
use crate::backend::BackendClient;
use crate::config::Config;
use crate::error::ExecutorError;
use crate::kv::KvBus;
use crate::llm::{LlmClient, create_client};
use crate::routing::ModelRouter;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A task as consumed off the queue. The runtime mutates only
/// `retry_count`, and only via the copy-on-retry path in
/// [`QueuedTask::for_retry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub instruction: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub agent_config: Option<AgentConfig>,
}

fn default_max_retries() -> u32 {
    3
}

/// A `Task` wrapped with its queue-assigned retry mutation point. A retry
/// is a distinct JSON payload pushed back to the queue, not a mutation of
/// the original in place.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task: Task,
}

impl QueuedTask {
    pub fn for_retry(&self) -> Task {
        let mut retried = self.task.clone();
        retried.retry_count += 1;
        retried
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tokens_used: u32,
    pub cost_dollars: f64,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

/// Owns a concurrency-limited pool of Agent slots and the queue handle.
pub struct AgentExecutor {
    config: Config,
    kv: KvBus,
    backend: BackendClient,
    llm: Arc<dyn LlmClient>,
    router: Option<Arc<ModelRouter>>,
    tools: Arc<ToolRegistry>,
    agents: DashMap<String, Arc<Agent>>,
    semaphore: Arc<Semaphore>,
}

impl AgentExecutor {
    /// Construct the LLM adapter, backend client, and queue handle; create
    /// a semaphore of size `num_agents`; register a default Agent named
    /// `"default"` using the configured default model and the full tool
    /// set. Idempotent in the sense that calling it again produces an
    /// independent, equally-initialized executor.
    pub async fn initialize(config: Config) -> Result<Self, ExecutorError> {
        debug!("AgentExecutor::initialize: called");
        let kv = KvBus::connect(&config.kv.url).await.map_err(|e| ExecutorError::Queue(e.to_string()))?;
        let backend = BackendClient::new(
            config.backend.base_url.clone(),
            config.backend.timeout_secs,
            config.backend.max_retries,
            std::env::var(&config.backend.api_key_env).ok(),
        );
        let llm_config = &config.llm;
        let llm = create_client(&llm_config.default_model, llm_config)
            .map_err(|e| ExecutorError::AgentFailed(e.to_string()))?;
        let router =
            if config.routing.enabled { Some(Arc::new(ModelRouter::new(config.routing.clone()))) } else { None };
        let tools = Arc::new(ToolRegistry::standard());

        let semaphore = Arc::new(Semaphore::new(config.worker.num_agents as usize));
        let agents = DashMap::new();

        let mut default_config = AgentConfig::new("default", llm_config.default_model.clone());
        default_config.tools = tools.list_names();
        let mut default_agent = Agent::new(default_config, llm.clone(), tools.clone());
        if let Some(router) = &router {
            default_agent = default_agent.with_router(router.clone());
        }
        agents.insert("default".to_string(), Arc::new(default_agent));

        Ok(Self { config, kv, backend, llm, router, tools, agents, semaphore })
    }

    /// Cancel each running task, await with a bounded timeout, close the
    /// queue and notifier, and drop all state. Running tasks are tracked
    /// only via the semaphore, so "cancel" here means: stop accepting new
    /// work and let in-flight permits drain within the timeout.
    pub async fn shutdown(&self) {
        info!("AgentExecutor::shutdown: called");
        let total_permits = self.config.worker.num_agents as usize;
        let timeout = Duration::from_secs(self.config.worker.graceful_shutdown_timeout_secs);
        let drain = self.semaphore.acquire_many(total_permits as u32);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("AgentExecutor::shutdown: timed out waiting for in-flight tasks to drain");
        }
    }

    pub fn register_agent(&self, agent: Agent) {
        debug!(name = %agent.config.name, "AgentExecutor::register_agent: called");
        self.agents.insert(agent.config.name.clone(), Arc::new(agent));
    }

    pub fn get_agent(&self, name: &str) -> Result<Arc<Agent>, ExecutorError> {
        self.agents.get(name).map(|entry| entry.value().clone()).ok_or_else(|| ExecutorError::AgentNotFound(name.to_string()))
    }

    /// Acquire the semaphore, pull one task with the configured poll
    /// timeout; if none, release and return nothing; otherwise execute it
    /// within the semaphore permit.
    pub async fn pull_and_execute(&mut self) -> Option<TaskResult> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;

        let payload = match self.kv.pull_task(&self.config.kv.task_queue_key, self.config.worker.poll_interval_secs).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                debug!(%e, "AgentExecutor::pull_and_execute: queue pull failed, swallowing");
                return None;
            }
        };

        let task: Task = match serde_json::from_str(&payload) {
            Ok(t) => t,
            Err(e) => {
                error!(%e, "AgentExecutor::pull_and_execute: malformed task payload");
                return None;
            }
        };

        let result = self.execute_task(task).await;
        drop(permit);
        Some(result)
    }

    /// Select an agent, notify the orchestrator that the task started,
    /// run it under an outer timeout, and translate success/timeout/error
    /// into a `TaskResult`.
    pub async fn execute_task(&mut self, task: Task) -> TaskResult {
        debug!(task_id = %task.id, "AgentExecutor::execute_task: called");
        let start = std::time::Instant::now();
        let agent = self.select_agent(&task);

        self.backend.notify_started(&task.id, &agent.config.name).await;

        let task_input = TaskInput {
            instruction: task.instruction.clone(),
            context: task.context.clone(),
            parameters: task.parameters.clone(),
        };

        let max_duration = Duration::from_secs(self.config.worker.max_task_duration_secs);
        let run_result = tokio::time::timeout(max_duration, agent.run(&task_input, task.trace_id.as_deref())).await;

        let result = match run_result {
            Ok(Ok(output)) => TaskResult {
                task_id: task.id.clone(),
                status: TaskStatus::Completed,
                result: Some(output.result),
                data: Some(output.data),
                error: None,
                tokens_used: output.metrics.tokens_used,
                cost_dollars: output.metrics.cost_dollars,
                duration_ms: output.metrics.duration_ms(),
                trace_id: task.trace_id.clone(),
                span_id: task.span_id.clone(),
            },
            Ok(Err(e)) => {
                let error = e.to_string();
                self.handle_task_failure(&task, &error).await;
                TaskResult {
                    task_id: task.id.clone(),
                    status: TaskStatus::Failed,
                    result: None,
                    data: None,
                    error: Some(error),
                    tokens_used: 0,
                    cost_dollars: 0.0,
                    duration_ms: start.elapsed().as_millis() as i64,
                    trace_id: task.trace_id.clone(),
                    span_id: task.span_id.clone(),
                }
            }
            Err(_) => {
                let error = format!("timed out after {} seconds", self.config.worker.max_task_duration_secs);
                self.handle_task_failure(&task, &error).await;
                TaskResult {
                    task_id: task.id.clone(),
                    status: TaskStatus::Failed,
                    result: None,
                    data: None,
                    error: Some(error),
                    tokens_used: 0,
                    cost_dollars: 0.0,
                    duration_ms: start.elapsed().as_millis() as i64,
                    trace_id: task.trace_id.clone(),
                    span_id: task.span_id.clone(),
                }
            }
        };

        self.report_result(&result).await;
        result
    }

    /// If the task carries an inline `agent_config`, construct a fresh,
    /// single-use Agent from it. Otherwise use the default agent.
    fn select_agent(&self, task: &Task) -> Arc<Agent> {
        match &task.agent_config {
            Some(config) => {
                let mut agent = Agent::new(config.clone(), self.llm.clone(), self.tools.clone());
                if let Some(router) = &self.router {
                    agent = agent.with_router(router.clone());
                }
                Arc::new(agent)
            }
            None => self.get_agent("default").expect("default agent is always registered at initialize time"),
        }
    }

    /// Retry if budget remains, otherwise this failure is terminal.
    async fn handle_task_failure(&mut self, task: &Task, error: &str) {
        warn!(task_id = %task.id, %error, "AgentExecutor::handle_task_failure: called");
        if task.retry_count < task.max_retries {
            let queued = QueuedTask { task: task.clone() };
            let retried = queued.for_retry();
            let payload = match serde_json::to_string(&retried) {
                Ok(p) => p,
                Err(e) => {
                    error!(%e, "AgentExecutor::handle_task_failure: failed to serialize retry payload");
                    return;
                }
            };
            if let Err(e) = self.kv.push_task_retry(&self.config.kv.task_queue_key, &payload).await {
                warn!(%e, "AgentExecutor::handle_task_failure: failed to re-enqueue, continuing");
            }
        }
    }

    /// Push to the result stream and notify the orchestrator, both
    /// best-effort: failures are logged, never raised.
    async fn report_result(&mut self, result: &TaskResult) {
        debug!(task_id = %result.task_id, status = %result.status, "AgentExecutor::report_result: called");
        match serde_json::to_string(result) {
            Ok(payload) => {
                if let Err(e) = self.kv.push_result(&self.config.kv.result_queue_key, &payload).await {
                    warn!(%e, "AgentExecutor::report_result: queue push failed, continuing");
                }
            }
            Err(e) => error!(%e, "AgentExecutor::report_result: failed to serialize result"),
        }
        self.backend.notify_completed(result).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_bumps_count_without_mutating_original() {
        let task = Task {
            id: "t1".to_string(),
            name: "n".to_string(),
            instruction: "do x".to_string(),
            context: HashMap::new(),
            parameters: HashMap::new(),
            priority: 0,
            max_retries: 3,
            retry_count: 0,
            trace_id: None,
            span_id: None,
            agent_config: None,
        };
        let queued = QueuedTask { task: task.clone() };
        let retried = queued.for_retry();
        assert_eq!(retried.retry_count, 1);
        assert_eq!(queued.task.retry_count, 0);
    }

    #[test]
    fn task_status_display_matches_queue_wire_format() {
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn task_deserializes_with_defaults_for_optional_fields() {
        let json = r#"{"id": "t1", "name": "n", "instruction": "do x"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.max_retries, 3);
        assert_eq!(task.retry_count, 0);
        assert!(task.agent_config.is_none());
    }
}
