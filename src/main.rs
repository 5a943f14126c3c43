mod api;
mod auth;
mod call;
mod config;
mod endpoint;
mod presence;
mod presenter;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use call::{CallController, Collaborators, DialpadAccumulator, IncomingCallRequest};
use config::Config;
use endpoint::registry::SessionRegistry;
use endpoint::sidecar::SidecarEndpoint;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub controller: CallController,
    /// Number being typed, edited through /api/dialpad.
    pub dialpad: Arc<Mutex<DialpadAccumulator>>,
    /// Latest non-direct incoming call awaiting accept/decline.
    pub pending_incoming: Arc<Mutex<Option<IncomingCallRequest>>>,
    /// Event channels of live sidecar sessions.
    pub sessions: SessionRegistry,
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("--version") => println!("calldeck {VERSION}"),
        Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            std::process::exit(1);
        }
        None => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(server());
        }
    }
}

fn print_usage() {
    println!("calldeck {VERSION}");
    println!("Call lifecycle controller for a calling-SDK sidecar");
    println!();
    println!("Usage: calldeck [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --version   Print version");
    println!("  --help, -h  Print this help message");
    println!();
    println!("Without options, starts the call server.");
}

async fn server() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calldeck=info,tower_http=info".into()),
        )
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        user = %config.account.username,
        "Starting calldeck"
    );

    let sessions = SessionRegistry::new();
    let sidecar = Arc::new(SidecarEndpoint::new(
        &config.sidecar,
        &config.account,
        sessions.clone(),
    ));

    let controller = CallController::new(
        config.call.clone(),
        config.account.username.clone(),
        Collaborators {
            tokens: auth::provider_from_config(&config.auth),
            endpoint: sidecar,
            presence: presence::reporter_from_config(config.presence.as_ref()),
        },
    );

    let dialpad = Arc::new(Mutex::new(DialpadAccumulator::new()));
    presenter::spawn(&controller, dialpad.clone());

    let state = AppState {
        config: config.clone(),
        controller,
        dialpad,
        pending_incoming: Arc::new(Mutex::new(None)),
        sessions,
    };

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid server address");

    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}

fn router(state: AppState) -> Router {
    Router::new()
        // Session callbacks from the calling-SDK sidecar
        .route("/sidecar/events", post(endpoint::webhook::handle_event))
        // Dialpad and call control
        .route("/api/dialpad", post(api::calls::handle_dialpad))
        .route("/api/call", post(api::calls::handle_call))
        .route("/api/hangup", post(api::calls::handle_hangup))
        .route("/api/hold", post(api::calls::handle_hold))
        .route("/api/mute", post(api::calls::handle_mute))
        .route("/api/dtmf", post(api::calls::handle_dtmf))
        .route("/api/state", get(api::calls::handle_state))
        // Push-delivered incoming calls
        .route("/api/incoming", post(api::incoming::handle_incoming))
        .route("/api/incoming/accept", post(api::incoming::handle_accept))
        .route("/api/incoming/decline", post(api::incoming::handle_decline))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
