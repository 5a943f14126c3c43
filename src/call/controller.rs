use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use super::dialpad::DialedNumber;
use super::dispatcher::{dispatch, Dispatch, SessionEventDispatcher, Subscription};
use super::error::CallError;
use super::incoming::{IncomingCallRequest, IncomingDisposition};
use super::presentation::{Controls, Presentation};
use super::state::{CallState, ElapsedTime};
use super::timer::{run_ticker, CallTimer};
use crate::auth::{AuthToken, TokenError, TokenProvider};
use crate::config::CallConfig;
use crate::endpoint::{CallEndpoint, Dtmf, PlacedCall, Session, SessionEvent};
use crate::presence::{PresenceQueue, PresenceReporter};

const PRESENTATION_BUFFER: usize = 64;

/// Collaborators a controller drives.
pub struct Collaborators {
    pub tokens: Arc<dyn TokenProvider>,
    pub endpoint: Arc<dyn CallEndpoint>,
    pub presence: Arc<dyn PresenceReporter>,
}

/// Single authority over which call, if any, is active and in what state.
///
/// Cheap to clone; all clones share one state machine. Every transition runs
/// under one async mutex, so user commands, session events and timer ticks
/// are applied strictly one at a time.
#[derive(Clone)]
pub struct CallController {
    inner: Arc<Shared>,
}

struct Shared {
    config: CallConfig,
    tokens: Arc<dyn TokenProvider>,
    endpoint: Arc<dyn CallEndpoint>,
    presence: PresenceQueue,
    presentation: broadcast::Sender<Presentation>,
    core: Mutex<Core>,
}

struct Core {
    state: CallState,
    /// Call attempt between `place_call` and the session arriving.
    attempt: Option<Attempt>,
    session: Option<ActiveSession>,
    held: bool,
    muted: bool,
    timer: CallTimer,
    ticker: Option<CancellationToken>,
    next_attempt: u64,
    ending_epoch: u64,
}

struct Attempt {
    id: u64,
    cancel: CancellationToken,
}

struct ActiveSession {
    session: Box<dyn Session>,
    subscription: Subscription,
}

impl Core {
    fn is_current(&self, attempt_id: u64) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.id == attempt_id)
    }

    fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session.id())
    }

    /// Presentation state implied by the media flags of a live call.
    fn in_call_state(&self) -> CallState {
        if self.held {
            CallState::Held
        } else if self.muted {
            CallState::Muted
        } else {
            CallState::Connected
        }
    }

    fn in_call_session(&self) -> Result<&dyn Session, CallError> {
        match &self.session {
            Some(active) if self.state.is_in_call() => Ok(active.session.as_ref()),
            _ => Err(CallError::NoActiveSession),
        }
    }
}

impl CallController {
    /// Must be called inside a tokio runtime; presence delivery runs on its own task.
    pub fn new(config: CallConfig, user_id: impl Into<String>, collaborators: Collaborators) -> Self {
        let (presentation, _) = broadcast::channel(PRESENTATION_BUFFER);
        Self {
            inner: Arc::new(Shared {
                config,
                tokens: collaborators.tokens,
                endpoint: collaborators.endpoint,
                presence: PresenceQueue::spawn(collaborators.presence, user_id),
                presentation,
                core: Mutex::new(Core {
                    state: CallState::Idle,
                    attempt: None,
                    session: None,
                    held: false,
                    muted: false,
                    timer: CallTimer::new(),
                    ticker: None,
                    next_attempt: 0,
                    ending_epoch: 0,
                }),
            }),
        }
    }

    /// Receive presentation commands from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Presentation> {
        self.inner.presentation.subscribe()
    }

    pub async fn state(&self) -> CallState {
        self.inner.core.lock().await.state
    }

    pub async fn elapsed(&self) -> ElapsedTime {
        self.inner.core.lock().await.timer.elapsed()
    }

    pub async fn has_session(&self) -> bool {
        self.inner.core.lock().await.session.is_some()
    }

    /// Authorize and place a call to `destination`.
    ///
    /// Returns once the calling SDK has accepted the call (state stays
    /// `Ringing` until the remote side progresses) or the attempt has failed.
    /// With a pre-authorized request carrying a token, no token is fetched.
    pub async fn place_call(
        &self,
        destination: DialedNumber,
        pre_auth: Option<IncomingCallRequest>,
    ) -> Result<(), CallError> {
        if destination.is_empty() {
            let err = CallError::InvalidDestination(String::new());
            self.notice(&err);
            return Err(err);
        }

        let (attempt_id, cancel) = {
            let mut core = self.inner.core.lock().await;
            if core.state != CallState::Idle || core.session.is_some() || core.attempt.is_some() {
                return Err(CallError::CallAlreadyActive(core.state));
            }
            core.next_attempt += 1;
            let attempt = Attempt {
                id: core.next_attempt,
                cancel: CancellationToken::new(),
            };
            let ids = (attempt.id, attempt.cancel.clone());
            core.attempt = Some(attempt);
            // Rendered before any network round trip.
            self.transition(&mut core, CallState::Ringing);
            ids
        };

        tracing::info!(
            attempt = attempt_id,
            destination = %destination,
            pre_authorized = pre_auth.is_some(),
            "Placing call"
        );

        let preset = pre_auth.and_then(|req| req.token).map(AuthToken::new);
        let token = match preset {
            Some(token) => token,
            None => match self.fetch_token(&cancel).await {
                Some(Ok(token)) => token,
                Some(Err(e)) => return Err(self.fail_attempt(attempt_id, e.into()).await),
                None => {
                    tracing::info!(attempt = attempt_id, "Token fetch discarded after cancel");
                    return Err(CallError::Cancelled);
                }
            },
        };

        let target = format!("{}{}", self.inner.config.destination_prefix, destination);

        // Not raced against cancel: a session the SDK creates must be seen so
        // it can be torn down.
        let placed = match self.set_up(&target, &token).await {
            Ok(placed) => placed,
            Err(e) => return Err(self.fail_attempt(attempt_id, CallError::CallSetupFailed(e)).await),
        };

        let mut core = self.inner.core.lock().await;
        if !core.is_current(attempt_id) {
            drop(core);
            let session_id = placed.session.id().to_string();
            tracing::info!(attempt = attempt_id, session_id = %session_id, "Tearing down session of cancelled attempt");
            if let Err(e) = placed.session.terminate().await {
                tracing::warn!(session_id = %session_id, "Failed to tear down late session: {e}");
            }
            return Err(CallError::Cancelled);
        }

        let PlacedCall { session, events } = placed;
        let session_id = session.id().to_string();
        let subscription = SessionEventDispatcher::subscribe(self.clone(), session_id.clone(), events);
        core.attempt = None;
        core.session = Some(ActiveSession {
            session,
            subscription,
        });
        self.publish_controls(&core);
        tracing::info!(attempt = attempt_id, session_id = %session_id, "Call placed, awaiting remote");
        Ok(())
    }

    /// Hand an inbound request to the controller. Direct calls are placed
    /// immediately to the caller's number; others are only presented.
    pub async fn handle_incoming(
        &self,
        request: IncomingCallRequest,
    ) -> Result<IncomingDisposition, CallError> {
        if !request.direct {
            tracing::info!(from = %request.from_number, "Presenting incoming call");
            self.publish(Presentation::IncomingCall(request));
            return Ok(IncomingDisposition::Presented);
        }

        let destination = DialedNumber::parse(&request.from_number)?;
        self.place_call(destination, Some(request)).await?;
        Ok(IncomingDisposition::Placed)
    }

    /// End whatever is going on. Never fails; the endpoint's own errors are
    /// logged and the state still moves to `Ending`.
    ///
    /// The session is hung up after the lock is released, so a calling SDK
    /// that never answers cannot block the settle to `Idle` or later commands.
    pub async fn terminate(&self) {
        let active = {
            let mut core = self.inner.core.lock().await;

            if let Some(attempt) = core.attempt.take() {
                tracing::info!(attempt = attempt.id, "Cancelling in-flight call attempt");
                attempt.cancel.cancel();
            }

            let active = core.session.take();
            self.enter_ending(&mut core);
            active
        };

        if let Some(active) = active {
            active.subscription.unsubscribe();
            let session_id = active.session.id().to_string();
            if let Err(e) = active.session.terminate().await {
                let err = CallError::EndpointTerminationError(e);
                tracing::warn!(session_id = %session_id, "{err}");
                self.notice(&err);
            } else {
                tracing::info!(session_id = %session_id, "Call terminated");
            }
        }
    }

    pub async fn toggle_hold(&self) -> Result<CallState, CallError> {
        let mut core = self.inner.core.lock().await;
        let on = !core.held;
        core.in_call_session()?
            .hold(on)
            .await
            .map_err(|e| self.media_error(e))?;
        core.held = on;
        let next = core.in_call_state();
        self.transition(&mut core, next);
        Ok(core.state)
    }

    pub async fn toggle_mute(&self) -> Result<CallState, CallError> {
        let mut core = self.inner.core.lock().await;
        let on = !core.muted;
        core.in_call_session()?
            .mute_audio(on)
            .await
            .map_err(|e| self.media_error(e))?;
        core.muted = on;
        let next = core.in_call_state();
        self.transition(&mut core, next);
        Ok(core.state)
    }

    /// Send one keypad symbol (`0-9`, `*`, `#`) as DTMF.
    pub async fn send_digit(&self, digit: char) -> Result<(), CallError> {
        let core = self.inner.core.lock().await;
        let session = core.in_call_session()?;
        let dtmf = Dtmf::try_from(digit).map_err(CallError::InvalidDigit)?;
        session.send_dtmf(dtmf).await.map_err(|e| self.media_error(e))
    }

    /// Apply one event from the session identified by `session_id`.
    pub async fn on_session_event(&self, session_id: &str, event: SessionEvent) {
        let mut core = self.inner.core.lock().await;

        if core.session_id() != Some(session_id) {
            tracing::debug!(session_id, ?event, "Ignoring event for discarded session");
            return;
        }

        match dispatch(core.state, &event) {
            Dispatch::Transition(CallState::Ending) => {
                if let SessionEvent::Terminated(reason) = &event {
                    tracing::info!(session_id, reason = ?reason, "Remote ended the call");
                }
                if let Some(active) = core.session.take() {
                    active.subscription.unsubscribe();
                }
                self.enter_ending(&mut core);
            }
            Dispatch::Transition(CallState::Connected) => {
                self.transition(&mut core, CallState::Connected);
                self.start_timer(&mut core);
            }
            Dispatch::Transition(next) => self.transition(&mut core, next),
            Dispatch::Observed => tracing::debug!(session_id, ?event, "Session event observed"),
            Dispatch::Ignored => {
                tracing::debug!(session_id, state = %core.state, ?event, "Session event ignored")
            }
        }
    }

    async fn on_tick(&self, epoch: u64) {
        let mut core = self.inner.core.lock().await;
        if let Some(elapsed) = core.timer.tick_for(epoch) {
            self.publish(Presentation::Elapsed(elapsed));
        }
    }

    async fn settle(&self, epoch: u64) {
        let mut core = self.inner.core.lock().await;
        if core.state == CallState::Ending && core.ending_epoch == epoch {
            self.transition(&mut core, CallState::Idle);
        }
    }

    /// Run the token fetch on its own task. `None` when cancelled first.
    async fn fetch_token(&self, cancel: &CancellationToken) -> Option<Result<AuthToken, TokenError>> {
        let tokens = Arc::clone(&self.inner.tokens);
        let mut fetch = tokio::spawn(async move { tokens.fetch_token().await });

        tokio::select! {
            _ = cancel.cancelled() => {
                fetch.abort();
                None
            }
            joined = &mut fetch => Some(joined.unwrap_or_else(|e| {
                Err(TokenError::Network(format!("token task failed: {e}")))
            })),
        }
    }

    async fn set_up(&self, target: &str, token: &AuthToken) -> Result<PlacedCall, crate::endpoint::EndpointError> {
        self.inner.endpoint.login().await?;
        self.inner.endpoint.call(target, Some(token.bearer())).await
    }

    /// Roll a failed attempt back to Idle, unless terminate() got there first.
    async fn fail_attempt(&self, attempt_id: u64, err: CallError) -> CallError {
        let mut core = self.inner.core.lock().await;
        if !core.is_current(attempt_id) {
            tracing::info!(attempt = attempt_id, "Ignoring failure of cancelled attempt: {err}");
            return CallError::Cancelled;
        }
        core.attempt = None;
        tracing::error!(attempt = attempt_id, "Call attempt failed: {err}");
        self.transition(&mut core, CallState::Idle);
        self.notice(&err);
        err
    }

    fn enter_ending(&self, core: &mut Core) {
        self.stop_timer(core);
        core.held = false;
        core.muted = false;

        if core.state == CallState::Ending {
            self.publish(Presentation::State(CallState::Ending));
            return;
        }

        self.transition(core, CallState::Ending);
        core.ending_epoch += 1;

        let epoch = core.ending_epoch;
        let delay = self.inner.config.settle_delay();
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.settle(epoch).await;
        });
    }

    fn start_timer(&self, core: &mut Core) {
        if let Some(old) = core.ticker.take() {
            old.cancel();
        }
        let epoch = core.timer.start();
        let cancel = CancellationToken::new();
        core.ticker = Some(cancel.clone());
        self.publish(Presentation::TimerStarted);
        self.publish(Presentation::Elapsed(core.timer.elapsed()));

        let controller = self.clone();
        tokio::spawn(run_ticker(self.inner.config.tick_interval(), cancel, move || {
            let controller = controller.clone();
            async move { controller.on_tick(epoch).await }
        }));
    }

    fn stop_timer(&self, core: &mut Core) {
        if let Some(ticker) = core.ticker.take() {
            ticker.cancel();
        }
        if core.timer.is_running() {
            core.timer.stop();
            self.publish(Presentation::TimerStopped);
        }
        // Elapsed time belongs to the call that just ended.
        core.timer.reset();
    }

    /// Move to `next` if the state machine has that edge. Publishes the new
    /// state, control enablement and agent presence.
    fn transition(&self, core: &mut Core, next: CallState) {
        let prev = core.state;
        if prev == next {
            return;
        }
        if !prev.can_transition_to(next) {
            tracing::error!(from = %prev, to = %next, "Refusing illegal call state transition");
            return;
        }

        core.state = next;
        tracing::info!(from = %prev, to = %next, "Call state changed");
        self.publish(Presentation::State(next));
        self.publish_controls(core);
        self.report_presence(next);
    }

    fn publish_controls(&self, core: &Core) {
        self.publish(Presentation::Controls(Controls::for_state(
            core.state,
            core.session.is_some(),
        )));
    }

    fn publish(&self, update: Presentation) {
        // No receivers is fine: nothing is rendering.
        let _ = self.inner.presentation.send(update);
    }

    fn notice(&self, err: &CallError) {
        self.publish(Presentation::Notice(err.to_string()));
    }

    fn media_error(&self, e: crate::endpoint::EndpointError) -> CallError {
        let err = CallError::MediaControlFailed(e);
        tracing::warn!("{err}");
        self.notice(&err);
        err
    }

    fn report_presence(&self, state: CallState) {
        self.inner.presence.submit(state.presence_label());
    }
}
