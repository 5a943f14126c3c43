//! Headless rendering of controller presentation commands.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::call::{CallController, CallState, DialpadAccumulator, Presentation};

/// Follow the controller's presentation stream for the life of the process.
///
/// Each command is logged; returning to idle clears the dialpad so the next
/// call starts from an empty number.
pub fn spawn(controller: &CallController, dialpad: Arc<Mutex<DialpadAccumulator>>) -> JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(update) => render(&update, &dialpad).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Presentation updates dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn render(update: &Presentation, dialpad: &Mutex<DialpadAccumulator>) {
    match update {
        Presentation::State(state) => {
            tracing::info!(state = %state, "Call state");
            if *state == CallState::Idle {
                dialpad.lock().await.clear();
            }
        }
        Presentation::Controls(controls) => tracing::debug!(?controls, "Controls"),
        Presentation::TimerStarted => tracing::debug!("Call timer started"),
        Presentation::TimerStopped => tracing::debug!("Call timer stopped"),
        Presentation::Elapsed(elapsed) => tracing::trace!(elapsed = %elapsed.display(), "Tick"),
        Presentation::Notice(message) => tracing::warn!("{message}"),
        Presentation::IncomingCall(request) => {
            tracing::info!(from = %request.from_number, "Incoming call waiting for answer");
        }
    }
}
