//! Orchestrator REST client: liveness, task lifecycle notifications, task
//! lookup. Every write is best-effort from the caller's point of view —
//! this module reports errors, callers decide whether to swallow them.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ExecutorError;
use crate::executor::TaskResult;

const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 60_000;

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64, max_retries: u32, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client build should not fail with static config");
        Self { http, base_url: base_url.into(), api_key, max_retries }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if key.starts_with("Bearer ") => builder.header("Authorization", key.clone()),
            Some(key) => builder.header("X-API-Key", key.clone()),
            None => builder,
        }
    }

    async fn send_with_retry(&self, make_request: impl Fn() -> reqwest::RequestBuilder) -> Result<reqwest::Response, ExecutorError> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            match self.request(make_request()).send().await {
                Ok(response) if response.status().is_server_error() && attempt < self.max_retries => {
                    last_error = format!("HTTP {}", response.status());
                }
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_retries => {
                    last_error = e.to_string();
                }
                Err(e) => return Err(ExecutorError::Queue(e.to_string())),
            }
            tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
        }
        Err(ExecutorError::Queue(last_error))
    }

    pub async fn health(&self) -> bool {
        debug!("BackendClient::health: called");
        match self.http.get(format!("{}/health", self.base_url)).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                warn!(%e, "BackendClient::health: request failed");
                false
            }
        }
    }

    /// Best-effort: errors are logged and swallowed, never surfaced to the
    /// caller — a task must not fail because the orchestrator is briefly
    /// unreachable.
    pub async fn notify_started(&self, task_id: &str, agent_id: &str) {
        debug!(%task_id, %agent_id, "BackendClient::notify_started: called");
        let url = format!("{}/api/v1/tasks/{}/start", self.base_url, task_id);
        let body = StartBody { agent_id };
        let result = self.send_with_retry(|| self.http.post(&url).json(&body)).await;
        if let Err(e) = result {
            warn!(%task_id, %e, "BackendClient::notify_started: failed, continuing");
        }
    }

    pub async fn notify_completed(&self, result: &TaskResult) {
        debug!(task_id = %result.task_id, "BackendClient::notify_completed: called");
        let url = format!("{}/api/v1/tasks/{}/complete", self.base_url, result.task_id);
        let outcome = self.send_with_retry(|| self.http.post(&url).json(result)).await;
        if let Err(e) = outcome {
            warn!(task_id = %result.task_id, %e, "BackendClient::notify_completed: failed, continuing");
        }
    }

    /// Returns `Ok(None)` for a 404 (absent task), `Err` for any other
    /// failure.
    pub async fn get_task(&self, task_id: &str) -> Result<Option<Value>, ExecutorError> {
        debug!(%task_id, "BackendClient::get_task: called");
        let url = format!("{}/api/v1/tasks/{}", self.base_url, task_id);
        let response = self.send_with_retry(|| self.http.get(&url)).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = response.json().await.map_err(|e| ExecutorError::Queue(e.to_string()))?;
        Ok(body.get("data").cloned())
    }
}

#[derive(Serialize)]
struct StartBody<'a> {
    agent_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefixed_key_uses_authorization_header() {
        let client = BackendClient::new("http://localhost", 30, 3, Some("Bearer abc".to_string()));
        let req = client.request(client.http.get("http://localhost/health")).build().unwrap();
        assert!(req.headers().contains_key("authorization"));
    }

    #[test]
    fn bare_key_uses_x_api_key_header() {
        let client = BackendClient::new("http://localhost", 30, 3, Some("secret".to_string()));
        let req = client.request(client.http.get("http://localhost/health")).build().unwrap();
        assert!(req.headers().contains_key("x-api-key"));
    }

    #[tokio::test]
    async fn health_reports_false_on_non_success_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri(), 5, 0, None);
        assert!(!client.health().await);
    }

    #[tokio::test]
    async fn get_task_returns_none_on_404() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/v1/tasks/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri(), 5, 0, None);
        assert_eq!(client.get_task("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_task_retries_past_a_server_error_then_succeeds() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/v1/tasks/t-1"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/v1/tasks/t-1"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"status": "done"}})))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri(), 5, 2, None);
        let task = client.get_task("t-1").await.unwrap();
        assert_eq!(task.unwrap()["status"], "done");
    }
}
