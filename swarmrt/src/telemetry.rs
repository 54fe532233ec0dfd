//! Logging/tracing initialization.
//!
//! The orchestrator's tracing backend is treated as an opaque span sink;
//! this module only wires up the ambient structured-logging stack
//! (`tracing` + `tracing-subscriber`) that every other module emits
//! `debug!`/`info!`/`warn!` calls into.

use std::fs;
use std::path::PathBuf;

use eyre::{Context, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::TracingConfig;

/// Initialize the global tracing subscriber.
///
/// Level priority: explicit CLI flag > config file `log-level` > `INFO`.
/// Writes to a log file under the platform data directory; also honors
/// `RUST_LOG` via `EnvFilter` for ad-hoc debugging.
pub fn init(cli_log_level: Option<&str>, config: &TracingConfig) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("swarmrt")
        .join("logs");
    fs::create_dir_all(&log_dir).context("failed to create log directory")?;

    let level_str = cli_log_level.or(config.log_level.as_deref());
    let level = parse_level(level_str);

    let log_file = fs::File::create(log_dir.join("swarmrt.log")).context("failed to create log file")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    tracing::info!(
        service = %config.service_name,
        sample_rate = config.sample_rate,
        enabled = config.enabled,
        ?level,
        "telemetry initialized"
    );
    Ok(())
}

fn parse_level(level_str: Option<&str>) -> Level {
    match level_str.map(str::to_uppercase).as_deref() {
        Some("TRACE") => Level::TRACE,
        Some("DEBUG") => Level::DEBUG,
        Some("INFO") => Level::INFO,
        Some("WARN") | Some("WARNING") => Level::WARN,
        Some("ERROR") => Level::ERROR,
        Some(other) => {
            eprintln!("Warning: unknown log level '{}', defaulting to INFO", other);
            Level::INFO
        }
        None => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_defaults_to_info() {
        assert_eq!(parse_level(None), Level::INFO);
        assert_eq!(parse_level(Some("unknown")), Level::INFO);
    }

    #[test]
    fn parse_level_matches_known_levels() {
        assert_eq!(parse_level(Some("debug")), Level::DEBUG);
        assert_eq!(parse_level(Some("WARN")), Level::WARN);
        assert_eq!(parse_level(Some("warning")), Level::WARN);
    }
}
