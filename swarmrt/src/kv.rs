//! Redis-backed key-value bus: task queue, result stream, heartbeats, and
//! the CNP message bus all share one connection manager.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::error::KvError;

/// Thin wrapper over a `redis::aio::ConnectionManager`. Cloning is cheap
/// (the manager multiplexes over one connection internally) so this can be
/// shared across Agents within a process.
#[derive(Clone)]
pub struct KvBus {
    conn: ConnectionManager,
    client: redis::Client,
}

impl KvBus {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        debug!(%url, "KvBus::connect: called");
        let client = redis::Client::open(url).map_err(|e| KvError::Connection(e.to_string()))?;
        let conn = client.get_connection_manager().await.map_err(|e| KvError::Connection(e.to_string()))?;
        Ok(Self { conn, client })
    }

    /// Blocking tail-pop from `key` with a timeout in seconds; `None` on
    /// timeout, never an error for "nothing to pull".
    pub async fn pull_task(&mut self, key: &str, timeout_secs: f64) -> Result<Option<String>, KvError> {
        let result: Option<(String, String)> = self.conn.brpop(key, timeout_secs).await?;
        Ok(result.map(|(_, payload)| payload))
    }

    /// Retries are redelivered quickly: push to the head, not the tail.
    pub async fn push_task_retry(&mut self, key: &str, payload: &str) -> Result<(), KvError> {
        let _: () = self.conn.lpush(key, payload).await?;
        Ok(())
    }

    pub async fn push_result(&mut self, key: &str, payload: &str) -> Result<(), KvError> {
        let _: () = self.conn.lpush(key, payload).await?;
        Ok(())
    }

    pub async fn heartbeat_set(&mut self, key: &str, payload: &str, ttl_secs: u64) -> Result<(), KvError> {
        let _: () = self.conn.set_ex(key, payload, ttl_secs).await?;
        Ok(())
    }

    pub async fn publish(&mut self, channel: &str, payload: &str) -> Result<(), KvError> {
        let _: () = self.conn.publish(channel, payload).await?;
        Ok(())
    }

    /// CNP bid queue: push to the tail of `apex:cnp:bids:{task_id}`.
    pub async fn bid_push(&mut self, task_id: &str, payload: &str) -> Result<(), KvError> {
        let key = format!("apex:cnp:bids:{}", task_id);
        let _: () = self.conn.rpush(key, payload).await?;
        Ok(())
    }

    /// CNP award queue: head-pop from `apex:cnp:awards:{agent_id}` with a
    /// timeout; `None` on timeout.
    pub async fn award_pop(&mut self, agent_id: &str, timeout_secs: f64) -> Result<Option<String>, KvError> {
        let key = format!("apex:cnp:awards:{}", agent_id);
        let result: Option<(String, String)> = self.conn.blpop(&key, timeout_secs).await?;
        Ok(result.map(|(_, payload)| payload))
    }

    pub async fn cnp_heartbeat_set(&mut self, task_id: &str, payload: &str, ttl_secs: u64) -> Result<(), KvError> {
        let key = format!("apex:cnp:heartbeat:{}", task_id);
        self.heartbeat_set(&key, payload, ttl_secs).await
    }

    /// Opens a dedicated pub/sub connection and subscribes to `channel`.
    /// Separate from the multiplexed `ConnectionManager` because pub/sub
    /// connections are stateful and can't share the manager's pool.
    pub async fn subscribe(&self, channel: &str) -> Result<redis::aio::PubSub, KvError> {
        let mut pubsub = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?
            .into_pubsub();
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_error_wraps_redis_error_message() {
        let client = redis::Client::open("redis://127.0.0.1:1").unwrap();
        let err = match client.get_connection() {
            Ok(_) => panic!("expected connection error"),
            Err(e) => e,
        };
        let kv_err: KvError = err.into();
        assert!(matches!(kv_err, KvError::Operation(_)));
    }
}
