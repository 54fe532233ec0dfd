//! Configuration types and loading.
//!
//! A flat, validated struct loaded from YAML with a fallback search chain,
//! mirroring the reference crate's `Config::load`. Secrets (API keys) are
//! read from environment variables named in `LlmConfig`, never stored in
//! the file itself.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub kv: KvConfig,
    pub llm: LlmConfig,
    pub worker: WorkerConfig,
    pub routing: RoutingConfig,
    pub tracing: TracingConfig,
}

impl Config {
    /// Load configuration with fallback chain: explicit path -> project
    /// local file -> user config dir -> built-in defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self, ConfigError> {
        let config = if let Some(path) = config_path {
            Self::load_from_file(path)?
        } else if Path::new("swarmrt.yml").exists() {
            Self::load_from_file("swarmrt.yml")?
        } else if let Some(dir) = dirs::config_dir() {
            let user_config = dir.join("swarmrt").join("swarmrt.yml");
            if user_config.exists() {
                Self::load_from_file(&user_config)?
            } else {
                tracing::info!("no config file found, using defaults");
                Self::default()
            }
        } else {
            tracing::info!("no config file found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path_str.clone(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_str.clone(),
            source,
        })?;
        tracing::info!(path = %path_str, "loaded config");
        Ok(config)
    }

    /// Read just the log level from a config file, before full parsing is
    /// safe to log (logging isn't initialized yet at this point).
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = config_path.cloned().or_else(|| {
            let local = PathBuf::from("swarmrt.yml");
            local.exists().then_some(local)
        })?;
        let content = fs::read_to_string(path).ok()?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
        value.get("tracing")?.get("log-level")?.as_str().map(str::to_string)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.api_key_env_vars().iter().all(|var| std::env::var(var).is_err()) {
            return Err(ConfigError::MissingCredentials(self.llm.api_key_env_vars().join(", ")));
        }

        if self.routing.enabled && self.routing.cascade.is_empty() {
            return Err(ConfigError::InvalidCascade("cascade must be non-empty when routing is enabled".into()));
        }

        check_range("worker.num_agents", self.worker.num_agents as f64, 1.0, 100.0)?;
        check_range("worker.poll_interval_secs", self.worker.poll_interval_secs, 0.1, 60.0)?;
        check_range("worker.heartbeat_interval_secs", self.worker.heartbeat_interval_secs, 1.0, 60.0)?;
        check_range("worker.max_task_duration_secs", self.worker.max_task_duration_secs as f64, 10.0, 3600.0)?;
        check_range(
            "worker.graceful_shutdown_timeout_secs",
            self.worker.graceful_shutdown_timeout_secs as f64,
            5.0,
            300.0,
        )?;
        check_range("routing.confidence_threshold", self.routing.confidence_threshold, 0.0, 1.0)?;
        check_range("tracing.sample_rate", self.tracing.sample_rate, 0.0, 1.0)?;

        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { field, min, max, value });
    }
    Ok(())
}

/// Orchestrator REST client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            api_key_env: "SWARMRT_BACKEND_API_KEY".to_string(),
        }
    }
}

/// Key-value bus configuration (Redis-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    pub url: String,
    #[serde(rename = "heartbeat-prefix")]
    pub heartbeat_prefix: String,
    #[serde(rename = "heartbeat-ttl-secs")]
    pub heartbeat_ttl_secs: u64,
    #[serde(rename = "task-queue-key")]
    pub task_queue_key: String,
    #[serde(rename = "result-queue-key")]
    pub result_queue_key: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            heartbeat_prefix: "apex:workers:heartbeat:".to_string(),
            heartbeat_ttl_secs: 30,
            task_queue_key: "apex:tasks:queue".to_string(),
            result_queue_key: "apex:tasks:results".to_string(),
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(rename = "default-model")]
    pub default_model: String,
    #[serde(rename = "openai-api-key-env")]
    pub openai_api_key_env: String,
    #[serde(rename = "anthropic-api-key-env")]
    pub anthropic_api_key_env: String,
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn api_key_env_vars(&self) -> Vec<&str> {
        vec![self.openai_api_key_env.as_str(), self.anthropic_api_key_env.as_str()]
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-3.5-turbo".to_string(),
            openai_api_key_env: "OPENAI_API_KEY".to_string(),
            anthropic_api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    #[serde(rename = "worker-id")]
    pub worker_id: Option<String>,
    #[serde(rename = "num-agents")]
    pub num_agents: u32,
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: f64,
    #[serde(rename = "heartbeat-interval-secs")]
    pub heartbeat_interval_secs: f64,
    #[serde(rename = "max-task-duration-secs")]
    pub max_task_duration_secs: u64,
    #[serde(rename = "graceful-shutdown-timeout-secs")]
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            num_agents: 5,
            poll_interval_secs: 1.0,
            heartbeat_interval_secs: 10.0,
            max_task_duration_secs: 300,
            graceful_shutdown_timeout_secs: 30,
        }
    }
}

/// Cascade routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub enabled: bool,
    pub cascade: Vec<String>,
    #[serde(rename = "confidence-threshold")]
    pub confidence_threshold: f64,
    #[serde(rename = "max-escalations")]
    pub max_escalations: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cascade: vec!["gpt-3.5-turbo".to_string(), "gpt-4-turbo".to_string(), "gpt-4".to_string()],
            confidence_threshold: 0.7,
            max_escalations: 2,
        }
    }
}

/// Logging/tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    /// Exporter endpoint, kept as part of the config surface even though the
    /// exporter backend itself isn't implemented; `telemetry::init` never
    /// reads this.
    #[serde(rename = "otlp-endpoint")]
    pub otlp_endpoint: Option<String>,
    #[serde(rename = "service-name")]
    pub service_name: String,
    #[serde(rename = "sample-rate")]
    pub sample_rate: f64,
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: None,
            service_name: "swarmrt".to_string(),
            sample_rate: 1.0,
            log_level: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let config = Config::default();
        assert_eq!(config.worker.num_agents, 5);
        assert_eq!(config.kv.task_queue_key, "apex:tasks:queue");
    }

    #[test]
    fn deserialize_partial_config_uses_defaults() {
        let yaml = r#"
worker:
  num-agents: 20
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.worker.num_agents, 20);
        assert_eq!(config.worker.poll_interval_secs, 1.0);
        assert_eq!(config.llm.default_model, "gpt-3.5-turbo");
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        // SAFETY: test runs single-threaded within this process for this var.
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
            std::env::remove_var("ANTHROPIC_API_KEY");
        }
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingCredentials(_))));
    }

    #[test]
    fn validate_rejects_empty_cascade_when_enabled() {
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "test-key");
        }
        let mut config = Config::default();
        config.routing.enabled = true;
        config.routing.cascade.clear();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCascade(_))));
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
    }
}
