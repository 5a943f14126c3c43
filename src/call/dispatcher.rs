use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::controller::CallController;
use super::state::CallState;
use crate::endpoint::{RemoteCallState, SessionEvent};

/// What a session event means for the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Transition(CallState),
    /// Seen but not acted on (DTMF from the far end, remote hold notices).
    Observed,
    /// Redundant or stale for the current state.
    Ignored,
}

/// Map one event onto the state machine. No I/O.
pub fn dispatch(state: CallState, event: &SessionEvent) -> Dispatch {
    use CallState::*;
    match event {
        SessionEvent::Progress(remote) => match (state, remote) {
            (Ringing, RemoteCallState::Connecting) => Dispatch::Transition(Connecting),
            (Ringing | Connecting, RemoteCallState::Connected) => Dispatch::Transition(Connected),
            (_, RemoteCallState::Hold) if state.is_in_call() => Dispatch::Observed,
            _ => Dispatch::Ignored,
        },
        SessionEvent::Terminated(_) if state.is_active() => Dispatch::Transition(Ending),
        SessionEvent::Terminated(_) => Dispatch::Ignored,
        SessionEvent::IncomingDtmf(_) => Dispatch::Observed,
    }
}

/// Live subscription to one session's event stream. Dropping it or calling
/// `unsubscribe` stops forwarding; the session itself stays with the controller.
#[derive(Debug)]
pub struct Subscription {
    session_id: String,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        tracing::debug!(session_id = %self.session_id, "Unsubscribing from session events");
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Forwards a session's events into the controller, tagged with the session
/// id so the controller can drop events for a session it already discarded.
pub struct SessionEventDispatcher;

impl SessionEventDispatcher {
    pub fn subscribe(
        controller: CallController,
        session_id: String,
        mut events: mpsc::Receiver<SessionEvent>,
    ) -> Subscription {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let id = session_id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            tracing::debug!(session_id = %id, ?event, "Session event");
                            controller.on_session_event(&id, event).await;
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!(session_id = %id, "Session event stream closed");
        });

        Subscription { session_id, cancel }
    }
}
