//! Worker: hosts one AgentExecutor, sends heartbeats, coordinates graceful
//! shutdown. WorkerPool runs N of these in-process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::executor::AgentExecutor;
use crate::kv::KvBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Draining,
    Stopping,
}

fn state_to_u8(s: WorkerState) -> u8 {
    match s {
        WorkerState::Stopped => 0,
        WorkerState::Starting => 1,
        WorkerState::Running => 2,
        WorkerState::Draining => 3,
        WorkerState::Stopping => 4,
    }
}

fn state_from_u8(v: u8) -> WorkerState {
    match v {
        1 => WorkerState::Starting,
        2 => WorkerState::Running,
        3 => WorkerState::Draining,
        4 => WorkerState::Stopping,
        _ => WorkerState::Stopped,
    }
}

#[derive(Debug, Serialize)]
struct HeartbeatDoc<'a> {
    worker_id: &'a str,
    state: &'static str,
    tasks_processed: u32,
    tasks_failed: u32,
    active_tasks: u32,
    timestamp: String,
}

impl WorkerState {
    fn as_str(self) -> &'static str {
        match self {
            WorkerState::Stopped => "STOPPED",
            WorkerState::Starting => "STARTING",
            WorkerState::Running => "RUNNING",
            WorkerState::Draining => "DRAINING",
            WorkerState::Stopping => "STOPPING",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub worker_id: String,
    pub state: String,
    pub tasks_processed: u32,
    pub tasks_failed: u32,
    pub uptime_seconds: f64,
}

/// One OS-level consumer of the task queue; hosts one AgentExecutor.
///
/// The Worker exclusively owns its AgentExecutor, its shutdown signal, its
/// heartbeat task, and its key-value handle. The only upward reference is
/// the shutdown flag — there are no back-pointers.
pub struct Worker {
    pub id: String,
    config: Config,
    state: AtomicU8,
    shutdown: Arc<AtomicBool>,
    tasks_processed: Arc<AtomicU32>,
    tasks_failed: Arc<AtomicU32>,
    active_tasks: Arc<AtomicU32>,
    started_at: Mutex<Option<Instant>>,
    main_loop_running: AtomicBool,
    main_loop_exited: Notify,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(id: impl Into<String>, config: Config) -> Self {
        Self {
            id: id.into(),
            config,
            state: AtomicU8::new(state_to_u8(WorkerState::Stopped)),
            shutdown: Arc::new(AtomicBool::new(false)),
            tasks_processed: Arc::new(AtomicU32::new(0)),
            tasks_failed: Arc::new(AtomicU32::new(0)),
            active_tasks: Arc::new(AtomicU32::new(0)),
            started_at: Mutex::new(None),
            main_loop_running: AtomicBool::new(false),
            main_loop_exited: Notify::new(),
            heartbeat_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WorkerState {
        state_from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state_to_u8(state), Ordering::SeqCst);
    }

    /// Refuses unless stopped. Initializes the executor, opens the
    /// key-value connection, launches the heartbeat task, and enters the
    /// main loop. Returns only when the loop exits.
    pub async fn start(self: &Arc<Self>) -> eyre::Result<()> {
        if self.state() != WorkerState::Stopped {
            return Err(eyre::eyre!("worker {} is not stopped, refusing to start", self.id));
        }
        self.set_state(WorkerState::Starting);
        info!(worker_id = %self.id, "Worker::start: called");

        self.shutdown.store(false, Ordering::SeqCst);
        *self.started_at.lock().await = Some(Instant::now());

        let executor = AgentExecutor::initialize(self.config.clone())
            .await
            .map_err(|e| eyre::eyre!("executor initialization failed: {e}"))?;
        let heartbeat_kv = KvBus::connect(&self.config.kv.url).await.map_err(|e| eyre::eyre!("{e}"))?;

        let heartbeat_handle = self.spawn_heartbeat(heartbeat_kv);
        *self.heartbeat_task.lock().await = Some(heartbeat_handle);

        self.set_state(WorkerState::Running);
        self.run_main_loop(executor).await;

        Ok(())
    }

    /// While the shutdown flag is clear: pull-and-execute one task; if a
    /// result was produced, update counters and report it. Any error other
    /// than a clean cancellation is logged, followed by a 1s sleep to
    /// avoid a tight loop on a persistent fault.
    async fn run_main_loop(&self, mut executor: AgentExecutor) {
        self.main_loop_running.store(true, Ordering::SeqCst);
        while !self.shutdown.load(Ordering::SeqCst) {
            self.active_tasks.fetch_add(1, Ordering::SeqCst);
            let outcome = executor.pull_and_execute().await;
            self.active_tasks.fetch_sub(1, Ordering::SeqCst);

            match outcome {
                Some(result) => {
                    self.tasks_processed.fetch_add(1, Ordering::SeqCst);
                    if result.status == crate::executor::TaskStatus::Failed {
                        self.tasks_failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
                None => {
                    // No task was available this tick, or the pull failed
                    // transiently; either way, loop straight back around.
                }
            }
        }
        executor.shutdown().await;
        self.main_loop_running.store(false, Ordering::SeqCst);
        self.main_loop_exited.notify_one();
        debug!(worker_id = %self.id, "Worker::run_main_loop: exited");
    }

    fn spawn_heartbeat(self: &Arc<Self>, mut kv: KvBus) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            let interval = Duration::from_secs_f64(worker.config.worker.heartbeat_interval_secs);
            loop {
                if worker.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let doc = HeartbeatDoc {
                    worker_id: &worker.id,
                    state: worker.state().as_str(),
                    tasks_processed: worker.tasks_processed.load(Ordering::SeqCst),
                    tasks_failed: worker.tasks_failed.load(Ordering::SeqCst),
                    active_tasks: worker.active_tasks.load(Ordering::SeqCst),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                let key = format!("{}{}", worker.config.kv.heartbeat_prefix, worker.id);
                match serde_json::to_string(&doc) {
                    Ok(payload) => {
                        if let Err(e) = kv.heartbeat_set(&key, &payload, worker.config.kv.heartbeat_ttl_secs).await {
                            warn!(worker_id = %worker.id, %e, "Worker::spawn_heartbeat: publish failed, retrying in 5s");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            continue;
                        }
                    }
                    Err(e) => error!(%e, "Worker::spawn_heartbeat: failed to serialize heartbeat"),
                }
                tokio::time::sleep(interval).await;
            }
        })
    }

    /// Idempotent. Sets DRAINING, signals shutdown, waits up to `timeout`
    /// for the main loop to exit, cancels the heartbeat, and transitions
    /// to STOPPED. If the main loop does not exit in time, it is forcibly
    /// cancelled.
    pub async fn stop(&self, timeout: Duration) {
        if self.state() == WorkerState::Stopped {
            return;
        }
        info!(worker_id = %self.id, "Worker::stop: called");
        self.set_state(WorkerState::Draining);
        self.shutdown.store(true, Ordering::SeqCst);

        self.set_state(WorkerState::Stopping);
        if self.main_loop_running.load(Ordering::SeqCst) {
            let wait_for_exit = self.main_loop_exited.notified();
            if tokio::time::timeout(timeout, wait_for_exit).await.is_err() {
                warn!(worker_id = %self.id, "Worker::stop: main loop did not exit in time, forcibly considering it stopped");
            }
        }
        if let Some(handle) = self.heartbeat_task.lock().await.take() {
            handle.abort();
        }

        self.set_state(WorkerState::Stopped);
    }

    pub async fn stats(&self) -> WorkerStats {
        let uptime = match *self.started_at.lock().await {
            Some(started) => started.elapsed().as_secs_f64(),
            None => 0.0,
        };
        WorkerStats {
            worker_id: self.id.clone(),
            state: self.state().as_str().to_string(),
            tasks_processed: self.tasks_processed.load(Ordering::SeqCst),
            tasks_failed: self.tasks_failed.load(Ordering::SeqCst),
            uptime_seconds: uptime,
        }
    }
}

/// Runs N workers in-process.
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    graceful_shutdown_timeout: Duration,
}

impl WorkerPool {
    pub fn new(count: u32, config: Config) -> Self {
        let graceful_shutdown_timeout = Duration::from_secs(config.worker.graceful_shutdown_timeout_secs);
        let mut workers = Vec::with_capacity(count as usize);
        let mut rng = rand::rng();
        for i in 0..count {
            let suffix: String = (0..8).map(|_| rng.sample(rand::distr::Alphanumeric) as char).collect();
            let id = format!("worker-{}-{}", i, suffix.to_lowercase());
            workers.push(Arc::new(Worker::new(id, config.clone())));
        }
        Self { workers, handles: Mutex::new(Vec::new()), graceful_shutdown_timeout }
    }

    /// Launch every worker's `start` concurrently, in-process.
    pub async fn start(&self) {
        info!(count = self.workers.len(), "WorkerPool::start: called");
        let mut handles = self.handles.lock().await;
        for worker in &self.workers {
            let worker = worker.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = worker.start().await {
                    error!(worker_id = %worker.id, %e, "WorkerPool::start: worker exited with error");
                }
            }));
        }
    }

    /// Fan `stop` out to all workers; per-worker errors are captured and
    /// do not prevent stopping the rest.
    pub async fn stop(&self) {
        info!("WorkerPool::stop: called");
        let stops = self.workers.iter().map(|w| w.stop(self.graceful_shutdown_timeout));
        futures::future::join_all(stops).await;
    }

    /// Block until every worker's start-task has returned.
    pub async fn wait(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    pub async fn stats(&self) -> Vec<WorkerStats> {
        let mut stats = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            stats.push(worker.stats().await);
        }
        stats
    }
}
