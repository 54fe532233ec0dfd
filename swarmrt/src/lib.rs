//! swarmrt - LLM-agent execution runtime
//!
//! A worker fleet that pulls tasks from a shared key-value bus, runs each
//! through an `Agent`'s reasoning-and-tool-use loop against a hosted LLM,
//! and reports results back, with guards against runaway cost (cascade
//! model routing, loop detection, diminishing-returns termination) and a
//! market-style task auction protocol (Contract-Net Protocol) layered on
//! top of the same bus.
//!
//! # Modules
//!
//! - [`worker`] - Worker/WorkerPool process lifecycle and heartbeats
//! - [`executor`] - AgentExecutor: concurrency-limited task intake and dispatch
//! - [`agent`] - Agent reasoning loop
//! - [`detect`] - LoopDetector and CostPerInsightTracker
//! - [`routing`] - FrugalGPT-style cascade ModelRouter
//! - [`llm`] - LLM provider adapters
//! - [`tools`] - Tool registry and built-in tools
//! - [`bidding`] - CNP BiddingAgent
//! - [`kv`] - Redis-backed key-value bus client
//! - [`backend`] - Orchestrator REST client
//! - [`config`] - Configuration types and loading
//! - [`telemetry`] - Logging/tracing initialization
//! - [`cli`] - Command-line interface

pub mod agent;
pub mod backend;
pub mod bidding;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod executor;
pub mod kv;
pub mod llm;
pub mod routing;
pub mod telemetry;
pub mod tools;
pub mod worker;

pub use agent::{Agent, AgentConfig, AgentMetrics, AgentStatus, TaskInput, TaskOutput};
pub use bidding::{AgentBid, AwardDecision, BiddingAgent, TaskAnnouncement};
pub use config::{Config, RoutingConfig};
pub use detect::{CostPerInsightTracker, LoopDetectionResult, LoopDetector, LoopType};
pub use error::{ConfigError, ExecutorError, LlmError, ToolError};
pub use executor::{AgentExecutor, QueuedTask, Task, TaskResult, TaskStatus};
pub use routing::{ModelRouter, RoutingResult};
pub use worker::{Worker, WorkerPool, WorkerState};
