//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// swarmrt - LLM-agent execution runtime
#[derive(Parser, Debug)]
#[command(name = "swarmrtd", about = "Worker fleet for LLM-agent task execution", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Path to config file (highest priority in the load chain)
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    /// Number of worker processes to run in this pool
    #[arg(long = "workers", help = "Number of workers in the pool")]
    pub workers: Option<u32>,

    /// Concurrent agents per worker
    #[arg(long = "agents", help = "Concurrent agents per worker")]
    pub agents: Option<u32>,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(long)]
    pub debug: bool,

    /// Orchestrator base URL, overriding the config file
    #[arg(long = "backend-url", help = "Orchestrator base URL")]
    pub backend_url: Option<String>,

    /// Key-value bus URL, overriding the config file
    #[arg(long = "kv-url", help = "Key-value bus URL")]
    pub kv_url: Option<String>,
}

impl Cli {
    /// Resolves the effective log level: `--debug` wins over `--log-level`.
    pub fn effective_log_level(&self) -> Option<String> {
        if self.debug {
            Some("debug".to_string())
        } else {
            self.log_level.clone()
        }
    }

    /// Number of Worker processes to run in the pool; `--workers` overrides,
    /// default is a single Worker.
    pub fn pool_size(&self) -> u32 {
        self.workers.unwrap_or(1)
    }

    /// Applies the CLI overrides on top of a loaded config. `--agents` sets
    /// the per-worker concurrency (`worker.num_agents`); `--workers` is the
    /// pool size, consumed separately via `pool_size()`.
    pub fn apply_overrides(&self, config: &mut crate::config::Config) {
        if let Some(agents) = self.agents {
            config.worker.num_agents = agents;
        }
        if let Some(url) = &self.backend_url {
            config.backend.base_url = url.clone();
        }
        if let Some(url) = &self.kv_url {
            config.kv.url = url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_with_no_flags() {
        let cli = Cli::parse_from(["swarmrtd"]);
        assert!(cli.config.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn debug_flag_wins_over_log_level() {
        let cli = Cli::parse_from(["swarmrtd", "--log-level", "warn", "--debug"]);
        assert_eq!(cli.effective_log_level(), Some("debug".to_string()));
    }

    #[test]
    fn parses_backend_and_kv_urls() {
        let cli = Cli::parse_from(["swarmrtd", "--backend-url", "http://host:9", "--kv-url", "redis://host:6379"]);
        assert_eq!(cli.backend_url, Some("http://host:9".to_string()));
        assert_eq!(cli.kv_url, Some("redis://host:6379".to_string()));
    }

    #[test]
    fn overrides_apply_onto_config() {
        let cli = Cli::parse_from(["swarmrtd", "--agents", "8", "--backend-url", "http://x"]);
        let mut config = crate::config::Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.worker.num_agents, 8);
        assert_eq!(config.backend.base_url, "http://x");
    }

    #[test]
    fn pool_size_defaults_to_one_worker() {
        let cli = Cli::parse_from(["swarmrtd"]);
        assert_eq!(cli.pool_size(), 1);
        let cli = Cli::parse_from(["swarmrtd", "--workers", "4"]);
        assert_eq!(cli.pool_size(), 4);
    }
}
