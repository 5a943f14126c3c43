use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::PresenceConfig;

/// Publishes the agent's call status so other parties can route to them.
#[async_trait]
pub trait PresenceReporter: Send + Sync {
    async fn report(&self, user_id: &str, status: &str) -> Result<(), PresenceError>;
}

/// Used when no `[presence]` section is configured.
pub struct NoopPresence;

#[async_trait]
impl PresenceReporter for NoopPresence {
    async fn report(&self, _user_id: &str, _status: &str) -> Result<(), PresenceError> {
        Ok(())
    }
}

/// `PUT {url}/agents/{user}` with `{"status": ...}`.
pub struct HttpPresenceReporter {
    client: reqwest::Client,
    url: String,
}

impl HttpPresenceReporter {
    pub fn new(config: &PresenceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PresenceReporter for HttpPresenceReporter {
    async fn report(&self, user_id: &str, status: &str) -> Result<(), PresenceError> {
        let resp = self
            .client
            .put(format!("{}/agents/{}", self.url, user_id))
            .json(&json!({ "status": status }))
            .send()
            .await
            .map_err(|e| PresenceError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PresenceError::Api(format!("{status}: {body}")));
        }
        Ok(())
    }
}

pub fn reporter_from_config(config: Option<&PresenceConfig>) -> Arc<dyn PresenceReporter> {
    match config {
        Some(c) => {
            tracing::info!(url = %c.url, "Reporting agent presence");
            Arc::new(HttpPresenceReporter::new(c))
        }
        None => Arc::new(NoopPresence),
    }
}

/// Delivers statuses to a reporter one at a time, in the order they were
/// submitted, so the store always ends on the latest status.
#[derive(Clone)]
pub struct PresenceQueue {
    tx: mpsc::UnboundedSender<&'static str>,
}

impl PresenceQueue {
    /// Start the delivery task. It exits once every queue handle is dropped.
    pub fn spawn(reporter: Arc<dyn PresenceReporter>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();

        tokio::spawn(async move {
            while let Some(status) = rx.recv().await {
                if let Err(e) = reporter.report(&user_id, status).await {
                    tracing::warn!(user_id = %user_id, status, "Failed to report presence: {e}");
                }
            }
        });

        Self { tx }
    }

    pub fn submit(&self, status: &'static str) {
        if self.tx.send(status).is_err() {
            tracing::warn!(status, "Presence delivery task has stopped");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Presence store error: {0}")]
    Api(String),
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::extract::{Path, State};
    use axum::routing::put;
    use axum::{Json, Router};

    use super::*;
    use crate::testing::serve;

    type Seen = Arc<Mutex<Vec<(String, String)>>>;

    #[tokio::test]
    async fn puts_status_for_agent() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/agents/{user}",
                put(
                    |State(seen): State<Seen>,
                     Path(user): Path<String>,
                     Json(body): Json<serde_json::Value>| async move {
                        let status = body["status"].as_str().unwrap_or_default().to_string();
                        seen.lock().unwrap().push((user, status));
                    },
                ),
            )
            .with_state(seen.clone());
        let url = serve(app).await;

        let reporter = HttpPresenceReporter::new(&PresenceConfig { url });
        reporter.report("agent-7", "In-Call").await.unwrap();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[("agent-7".to_string(), "In-Call".to_string())]
        );
    }

    /// Holds back the first report so a naive fire-and-forget sender would
    /// deliver the second one first.
    struct SlowFirst {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PresenceReporter for SlowFirst {
        async fn report(&self, _user_id: &str, status: &str) -> Result<(), PresenceError> {
            if status == "Ringing" {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            }
            self.seen.lock().unwrap().push(status.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn queue_delivers_in_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = PresenceQueue::spawn(Arc::new(SlowFirst { seen: seen.clone() }), "agent-7");

        queue.submit("Ringing");
        queue.submit("Idle");

        for _ in 0..100 {
            if seen.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(seen.lock().unwrap().as_slice(), &["Ringing", "Idle"]);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let url = serve(Router::new()).await;
        let reporter = HttpPresenceReporter::new(&PresenceConfig { url });
        let err = reporter.report("agent-7", "Idle").await.unwrap_err();
        assert!(matches!(err, PresenceError::Api(msg) if msg.starts_with("404")));
    }
}
