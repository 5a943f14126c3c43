use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::registry::{DeliveryError, SessionRegistry};
use super::{RemoteCallState, SessionEvent};

/// Event pushed by the sidecar for one session.
#[derive(Debug, Deserialize)]
pub struct SidecarEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub event: SidecarEventKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SidecarEventKind {
    Progress { state: RemoteCallState },
    Terminated {
        #[serde(default)]
        reason: Option<String>,
    },
    /// DTMF received from the far end.
    Notify {
        #[serde(default)]
        dtmf: Option<String>,
    },
}

impl From<SidecarEventKind> for SessionEvent {
    fn from(kind: SidecarEventKind) -> Self {
        match kind {
            SidecarEventKind::Progress { state } => SessionEvent::Progress(state),
            SidecarEventKind::Terminated { reason } => SessionEvent::Terminated(reason),
            SidecarEventKind::Notify { dtmf } => SessionEvent::IncomingDtmf(dtmf),
        }
    }
}

/// Handle POST /sidecar/events: Session callbacks from the calling SDK.
///
/// Events for sessions we no longer track get a 404 so the sidecar can stop
/// retrying; the controller never sees them.
pub async fn handle_event(
    State(registry): State<SessionRegistry>,
    Json(payload): Json<SidecarEvent>,
) -> Response {
    let session_id = payload.session_id;
    let event = SessionEvent::from(payload.event);
    tracing::debug!(session_id = %session_id, ?event, "Sidecar event");

    match registry.deliver(&session_id, event).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ DeliveryError::UnknownSession(_)) => {
            tracing::debug!("{e}");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e @ DeliveryError::Closed(_)) => {
            tracing::warn!("{e}");
            StatusCode::GONE.into_response()
        }
    }
}
