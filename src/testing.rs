//! In-memory collaborators and helpers shared by tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Notify};

use crate::auth::{AuthToken, TokenError, TokenProvider};
use crate::call::{CallController, CallState, Collaborators, Presentation};
use crate::config::CallConfig;
use crate::endpoint::{CallEndpoint, Dtmf, EndpointError, PlacedCall, Session, SessionEvent};
use crate::presence::{PresenceError, PresenceReporter};

/// Serve `app` on an ephemeral local port; returns its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub type Log = Arc<Mutex<Vec<String>>>;

/// Token provider returning queued results, optionally held behind a gate.
#[derive(Default)]
pub struct FakeTokens {
    results: Mutex<VecDeque<Result<AuthToken, TokenError>>>,
    pub fetches: AtomicUsize,
    pub started: Notify,
    gate: Option<Arc<Notify>>,
}

impl FakeTokens {
    pub fn ok(token: &str) -> Self {
        let tokens = Self::default();
        tokens.push(Ok(AuthToken::new(token)));
        tokens
    }

    pub fn failing(err: TokenError) -> Self {
        let tokens = Self::default();
        tokens.push(Err(err));
        tokens
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn push(&self, result: Result<AuthToken, TokenError>) {
        self.results.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn fetch_token(&self) -> Result<AuthToken, TokenError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(AuthToken::new("default-token")))
    }
}

/// Calling SDK double. Records every operation into `log` and hands the
/// test the sending half of each session's event stream.
#[derive(Default)]
pub struct FakeEndpoint {
    pub log: Log,
    senders: Mutex<Vec<mpsc::Sender<SessionEvent>>>,
    pub fail_call: Mutex<Option<EndpointError>>,
    pub fail_terminate: bool,
    /// Sessions whose terminate never completes.
    pub hang_terminate: bool,
    pub call_started: Notify,
    call_gate: Option<Arc<Notify>>,
    next_id: AtomicUsize,
}

impl FakeEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_terminate(mut self) -> Self {
        self.fail_terminate = true;
        self
    }

    pub fn with_hanging_terminate(mut self) -> Self {
        self.hang_terminate = true;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.call_gate = Some(gate);
        self
    }

    /// Event sender of the `n`th placed session.
    pub fn events(&self, n: usize) -> mpsc::Sender<SessionEvent> {
        self.senders.lock().unwrap()[n].clone()
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallEndpoint for FakeEndpoint {
    async fn login(&self) -> Result<(), EndpointError> {
        self.log.lock().unwrap().push("login".into());
        Ok(())
    }

    async fn call(&self, destination: &str, token: Option<&str>) -> Result<PlacedCall, EndpointError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("call {destination} {}", token.unwrap_or("-")));
        self.call_started.notify_one();
        if let Some(gate) = &self.call_gate {
            gate.notified().await;
        }
        let failure = self.fail_call.lock().unwrap().take();
        if let Some(err) = failure {
            return Err(err);
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().unwrap().push(tx);
        Ok(PlacedCall {
            session: Box::new(FakeSession {
                id: format!("session-{n}"),
                log: Arc::clone(&self.log),
                fail_terminate: self.fail_terminate,
                hang_terminate: self.hang_terminate,
            }),
            events: rx,
        })
    }
}

pub struct FakeSession {
    id: String,
    log: Log,
    fail_terminate: bool,
    hang_terminate: bool,
}

#[async_trait]
impl Session for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn terminate(&self) -> Result<(), EndpointError> {
        self.log.lock().unwrap().push(format!("terminate {}", self.id));
        if self.hang_terminate {
            std::future::pending::<()>().await;
        }
        if self.fail_terminate {
            return Err(EndpointError::Api("503: sdk unavailable".into()));
        }
        Ok(())
    }

    async fn hold(&self, on: bool) -> Result<(), EndpointError> {
        self.log.lock().unwrap().push(format!("hold {on}"));
        Ok(())
    }

    async fn mute_audio(&self, on: bool) -> Result<(), EndpointError> {
        self.log.lock().unwrap().push(format!("mute {on}"));
        Ok(())
    }

    async fn send_dtmf(&self, digit: Dtmf) -> Result<(), EndpointError> {
        self.log.lock().unwrap().push(format!("dtmf {}", digit.symbol()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPresence {
    pub statuses: Log,
}

#[async_trait]
impl PresenceReporter for RecordingPresence {
    async fn report(&self, user_id: &str, status: &str) -> Result<(), PresenceError> {
        self.statuses.lock().unwrap().push(format!("{user_id}:{status}"));
        Ok(())
    }
}

pub fn test_config() -> CallConfig {
    CallConfig {
        destination_prefix: "+".into(),
        settle_delay_ms: 2000,
        tick_interval_ms: 1000,
    }
}

pub fn controller(
    tokens: Arc<FakeTokens>,
    endpoint: Arc<FakeEndpoint>,
    presence: Arc<RecordingPresence>,
) -> CallController {
    controller_with(test_config(), tokens, endpoint, presence)
}

pub fn controller_with(
    config: CallConfig,
    tokens: Arc<FakeTokens>,
    endpoint: Arc<FakeEndpoint>,
    presence: Arc<dyn PresenceReporter>,
) -> CallController {
    CallController::new(
        config,
        "agent-7",
        Collaborators {
            tokens,
            endpoint,
            presence,
        },
    )
}

/// Poll until the controller reaches `state`, failing after a generous bound.
pub async fn wait_for_state(controller: &CallController, state: CallState) {
    for _ in 0..500 {
        if controller.state().await == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("controller never reached {state}, stuck in {}", controller.state().await);
}

/// Every state published so far, in order.
pub fn drain_states(rx: &mut broadcast::Receiver<Presentation>) -> Vec<CallState> {
    drain(rx)
        .into_iter()
        .filter_map(|p| match p {
            Presentation::State(s) => Some(s),
            _ => None,
        })
        .collect()
}

pub fn drain(rx: &mut broadcast::Receiver<Presentation>) -> Vec<Presentation> {
    let mut out = Vec::new();
    while let Ok(p) = rx.try_recv() {
        out.push(p);
    }
    out
}

/// Application state around `controller` with a throwaway config.
pub fn app_state(controller: CallController, api_token: &str) -> crate::AppState {
    use crate::config::{
        AccountConfig, ApiConfig, AuthConfig, Config, ServerConfig, SidecarConfig,
    };

    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        account: AccountConfig {
            username: "agent-7".into(),
            display_name: String::new(),
            password: String::new(),
        },
        auth: AuthConfig {
            url: "http://127.0.0.1:1/token".into(),
            user: "client".into(),
            pass: "secret".into(),
            cache_tokens: false,
            refresh_margin_secs: 30,
            request_timeout_ms: 1000,
        },
        sidecar: SidecarConfig {
            url: "http://127.0.0.1:1".into(),
            event_buffer: 16,
            request_timeout_ms: 1000,
        },
        call: test_config(),
        api: ApiConfig {
            token: api_token.into(),
        },
        presence: None,
    };

    crate::AppState {
        config,
        controller,
        dialpad: Arc::new(tokio::sync::Mutex::new(crate::call::DialpadAccumulator::new())),
        pending_incoming: Arc::new(tokio::sync::Mutex::new(None)),
        sessions: crate::endpoint::registry::SessionRegistry::new(),
    }
}
