//! Contract-Net Protocol bidder: listens for task announcements on the
//! shared bus, evaluates fit with load-aware marginal cost, submits bids,
//! and heartbeats while a task it won is in flight.
//!
//! The bid math lives in [`BidEngine`], a pure struct with no I/O, so it
//! can be exercised without a live key-value bus. [`BiddingAgent`] wraps
//! it with the Redis-backed announce/bid/award/heartbeat plumbing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::BiddingError;
use crate::kv::KvBus;

pub const ANNOUNCEMENTS_CHANNEL: &str = "apex:cnp:announcements";

const LOAD_FACTOR: f64 = 0.002;

pub type AnnouncementCallback = Box<dyn Fn(TaskAnnouncement) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAnnouncement {
    pub task_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_min_bid_count")]
    pub min_bid_count: u32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_deadline_secs() -> u64 {
    30
}

fn default_min_bid_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBid {
    pub agent_id: String,
    pub task_id: String,
    pub estimated_cost: f64,
    pub estimated_duration: f64,
    pub confidence: f64,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardDecision {
    pub task_id: String,
    pub winning_bid: serde_json::Value,
    #[serde(default)]
    pub runner_up: Option<serde_json::Value>,
    #[serde(default)]
    pub total_bids: u32,
}

/// Pure bid-computation core: capability matching, marginal cost, and
/// confidence scoring. Holds no connection, so it is cheap to construct in
/// isolation for tests.
pub struct BidEngine {
    agent_id: String,
    capabilities: Vec<String>,
    base_cost: f64,
    complexity_premium: f64,
    queue_depth: AtomicI64,
}

impl BidEngine {
    pub fn new(agent_id: String, capabilities: Vec<String>, base_cost: f64, complexity_premium: f64) -> Self {
        Self {
            agent_id,
            capabilities,
            base_cost,
            complexity_premium,
            queue_depth: AtomicI64::new(0),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn current_queue_depth(&self) -> i64 {
        self.queue_depth.load(Ordering::SeqCst)
    }

    fn increment_queue_depth(&self) {
        self.queue_depth.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_queue_depth(&self) {
        let _ = self
            .queue_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some((v - 1).max(0)));
    }

    /// `round(base_cost + 0.002*queue_depth + complexity_premium*|requirements|, 6)`.
    pub fn marginal_cost(&self, announcement: &TaskAnnouncement) -> f64 {
        let raw = self.base_cost
            + LOAD_FACTOR * self.current_queue_depth() as f64
            + self.complexity_premium * announcement.requirements.len() as f64;
        (raw * 1_000_000.0).round() / 1_000_000.0
    }

    /// `None` when `requirements` is non-empty and none of it is covered.
    pub fn evaluate_task(&self, announcement: &TaskAnnouncement) -> Option<AgentBid> {
        let owned: HashSet<&str> = self.capabilities.iter().map(String::as_str).collect();
        let matched: Vec<String> = announcement
            .requirements
            .iter()
            .filter(|req| owned.contains(req.as_str()))
            .cloned()
            .collect();

        if !announcement.requirements.is_empty() && matched.is_empty() {
            debug!(task_id = %announcement.task_id, "skipping task, no capability match");
            return None;
        }

        let match_ratio = if announcement.requirements.is_empty() {
            1.0
        } else {
            matched.len() as f64 / announcement.requirements.len() as f64
        };

        let load_penalty = (1.0 - 0.1 * self.current_queue_depth() as f64).max(0.5);
        let confidence = (match_ratio * load_penalty).min(1.0);
        let estimated_duration = 10.0 + 5.0 * announcement.requirements.len() as f64;

        let capabilities = if announcement.requirements.is_empty() {
            self.capabilities.clone()
        } else {
            matched
        };

        Some(AgentBid {
            agent_id: self.agent_id.clone(),
            task_id: announcement.task_id.clone(),
            estimated_cost: self.marginal_cost(announcement),
            estimated_duration,
            confidence,
            capabilities,
        })
    }
}

/// Redis-backed CNP participant wrapping a [`BidEngine`].
pub struct BiddingAgent {
    engine: BidEngine,
    kv: KvBus,
    heartbeat_interval_secs: f64,
    heartbeat_ttl_secs: u64,
    active_tasks: Mutex<HashSet<String>>,
    heartbeat_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl BiddingAgent {
    pub fn new(
        agent_id: Option<String>,
        capabilities: Vec<String>,
        kv: KvBus,
        base_cost: f64,
        complexity_premium: f64,
        heartbeat_interval_secs: f64,
        heartbeat_ttl_secs: u64,
    ) -> Self {
        let agent_id = agent_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        Self {
            engine: BidEngine::new(agent_id, capabilities, base_cost, complexity_premium),
            kv,
            heartbeat_interval_secs,
            heartbeat_ttl_secs,
            active_tasks: Mutex::new(HashSet::new()),
            heartbeat_tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn agent_id(&self) -> &str {
        self.engine.agent_id()
    }

    pub fn current_queue_depth(&self) -> i64 {
        self.engine.current_queue_depth()
    }

    pub fn evaluate_task(&self, announcement: &TaskAnnouncement) -> Option<AgentBid> {
        self.engine.evaluate_task(announcement)
    }

    /// Subscribes to the announcements channel and, for each decodable
    /// message, either invokes `callback` or auto-evaluates and bids.
    /// Malformed payloads are skipped with a warning, never fatal.
    pub async fn listen(self: Arc<Self>, callback: Option<AnnouncementCallback>) -> Result<(), BiddingError> {
        let mut pubsub = self.kv.subscribe(ANNOUNCEMENTS_CHANNEL).await?;
        let mut stream = pubsub.on_message();
        info!(agent_id = %self.agent_id(), "listening for task announcements");

        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(%e, "ignoring malformed announcement payload");
                    continue;
                }
            };
            let announcement: TaskAnnouncement = match serde_json::from_str(&payload) {
                Ok(a) => a,
                Err(e) => {
                    warn!(%e, "ignoring malformed announcement");
                    continue;
                }
            };

            match &callback {
                Some(cb) => cb(announcement).await,
                None => self.auto_evaluate_and_bid(&announcement).await,
            }
        }
        Ok(())
    }

    async fn auto_evaluate_and_bid(&self, announcement: &TaskAnnouncement) {
        if let Some(bid) = self.evaluate_task(announcement) {
            if let Err(e) = self.submit_bid(&bid).await {
                warn!(task_id = %announcement.task_id, %e, "failed to submit bid");
            }
        }
    }

    pub async fn submit_bid(&self, bid: &AgentBid) -> Result<(), BiddingError> {
        let payload = serde_json::to_string(bid).map_err(|e| BiddingError::Malformed(e.to_string()))?;
        let mut kv = self.kv.clone();
        kv.bid_push(&bid.task_id, &payload).await?;
        info!(task_id = %bid.task_id, cost = bid.estimated_cost, confidence = bid.confidence, "bid submitted");
        Ok(())
    }

    /// Head-pop from this agent's award queue with a timeout; `None` on
    /// timeout, not an error.
    pub async fn await_award(&self, timeout_secs: f64) -> Result<Option<AwardDecision>, BiddingError> {
        let mut kv = self.kv.clone();
        let payload = match kv.award_pop(self.agent_id(), timeout_secs).await? {
            Some(p) => p,
            None => return Ok(None),
        };
        let decision: AwardDecision = serde_json::from_str(&payload).map_err(|e| BiddingError::Malformed(e.to_string()))?;
        Ok(Some(decision))
    }

    pub async fn handle_award(self: &Arc<Self>, award: &AwardDecision) {
        let task_id = award.task_id.clone();
        self.active_tasks.lock().await.insert(task_id.clone());
        self.engine.increment_queue_depth();
        info!(%task_id, "task awarded, starting execution");

        let agent = Arc::clone(self);
        let heartbeat_task_id = task_id.clone();
        let handle = tokio::spawn(async move {
            agent.heartbeat_loop(heartbeat_task_id).await;
        });
        self.heartbeat_tasks.lock().await.insert(task_id, handle);
    }

    async fn heartbeat_loop(&self, task_id: String) {
        debug!(%task_id, "starting heartbeat");
        let mut kv = self.kv.clone();
        loop {
            let payload = serde_json::json!({
                "agent_id": self.agent_id(),
                "task_id": task_id,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })
            .to_string();
            if let Err(e) = kv.cnp_heartbeat_set(&task_id, &payload, self.heartbeat_ttl_secs).await {
                warn!(%task_id, %e, "heartbeat send failed, continuing");
            }
            tokio::time::sleep(Duration::from_secs_f64(self.heartbeat_interval_secs)).await;
        }
    }

    pub async fn complete_task(&self, task_id: &str) {
        self.active_tasks.lock().await.remove(task_id);
        self.engine.decrement_queue_depth();
        if let Some(handle) = self.heartbeat_tasks.lock().await.remove(task_id) {
            handle.abort();
        }
        info!(%task_id, "task completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(requirements: Vec<&str>) -> TaskAnnouncement {
        TaskAnnouncement {
            task_id: "t-1".to_string(),
            description: "do the thing".to_string(),
            requirements: requirements.into_iter().map(String::from).collect(),
            deadline_secs: 30,
            min_bid_count: 1,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn marginal_cost_matches_the_documented_formula() {
        let engine = BidEngine::new("a1".to_string(), vec!["code".into(), "math".into(), "search".into()], 0.01, 0.005);
        for _ in 0..5 {
            engine.increment_queue_depth();
        }
        let cost = engine.marginal_cost(&announcement(vec!["code", "math", "search"]));
        assert_eq!(cost, 0.035);
    }

    #[test]
    fn evaluate_task_declines_when_no_capability_overlaps() {
        let engine = BidEngine::new("a1".to_string(), vec!["math".into()], 0.01, 0.005);
        assert!(engine.evaluate_task(&announcement(vec!["code"])).is_none());
    }

    #[test]
    fn evaluate_task_accepts_empty_requirements_with_full_confidence() {
        let engine = BidEngine::new("a1".to_string(), vec!["math".into()], 0.01, 0.005);
        let bid = engine.evaluate_task(&announcement(vec![])).unwrap();
        assert_eq!(bid.confidence, 1.0);
        assert_eq!(bid.capabilities, vec!["math".to_string()]);
    }

    #[test]
    fn evaluate_task_confidence_degrades_with_queue_depth() {
        let engine = BidEngine::new("a1".to_string(), vec!["code".into()], 0.01, 0.005);
        for _ in 0..4 {
            engine.increment_queue_depth();
        }
        let bid = engine.evaluate_task(&announcement(vec!["code"])).unwrap();
        assert_eq!(bid.confidence, 0.6);
    }

    #[test]
    fn queue_depth_never_goes_negative() {
        let engine = BidEngine::new("a1".to_string(), vec![], 0.01, 0.005);
        engine.decrement_queue_depth();
        assert_eq!(engine.current_queue_depth(), 0);
    }

    #[test]
    fn task_announcement_round_trips_with_defaulted_fields() {
        let json = r#"{"task_id": "t-9"}"#;
        let decoded: TaskAnnouncement = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.deadline_secs, 30);
        assert_eq!(decoded.min_bid_count, 1);
        assert!(decoded.requirements.is_empty());
    }
}
