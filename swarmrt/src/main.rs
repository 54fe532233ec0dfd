//! swarmrtd - worker fleet entry point.

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use swarmrt::cli::Cli;
use swarmrt::config::Config;
use swarmrt::telemetry;
use swarmrt::worker::WorkerPool;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("fatal: {:#}", e);
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    telemetry::init(cli.effective_log_level().as_deref(), &config.tracing).context("failed to initialize telemetry")?;

    info!(pool_size = cli.pool_size(), num_agents = config.worker.num_agents, "swarmrtd starting");

    let pool = WorkerPool::new(cli.pool_size(), config);
    pool.start().await;

    wait_for_shutdown_signal().await;
    warn!("shutdown signal received, draining workers");

    pool.stop().await;
    pool.wait().await;

    info!("swarmrtd stopped cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            debug!(%e, "failed to install SIGINT handler, falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            debug!(%e, "failed to install SIGTERM handler, falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => debug!("received SIGINT"),
        _ = sigterm.recv() => debug!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
