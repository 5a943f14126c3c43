use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use super::SessionEvent;

/// Routes sidecar notifications to the event channel of the session they
/// belong to, keyed by session id.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, mpsc::Sender<SessionEvent>>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new session's event channel.
    pub async fn register(&self, session_id: String, events_tx: mpsc::Sender<SessionEvent>) {
        tracing::info!(session_id = %session_id, "Session registered");
        self.inner.lock().await.insert(session_id, events_tx);
    }

    /// Forget a session. Dropping the sender closes its event stream.
    pub async fn deregister(&self, session_id: &str) {
        if self.inner.lock().await.remove(session_id).is_some() {
            tracing::info!(session_id = %session_id, "Session deregistered");
        }
    }

    #[cfg(test)]
    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.lock().await.contains_key(session_id)
    }

    /// Deliver one event. A terminated session is deregistered after delivery.
    pub async fn deliver(&self, session_id: &str, event: SessionEvent) -> Result<(), DeliveryError> {
        let tx = self
            .inner
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| DeliveryError::UnknownSession(session_id.to_string()))?;

        let terminal = matches!(event, SessionEvent::Terminated(_));

        // Lock released: a full channel must not stall other sessions.
        let sent = tx.send(event).await;
        if terminal || sent.is_err() {
            self.deregister(session_id).await;
        }
        sent.map_err(|_| DeliveryError::Closed(session_id.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("No session with id {0}")]
    UnknownSession(String),
    #[error("Event stream for session {0} is closed")]
    Closed(String),
}
