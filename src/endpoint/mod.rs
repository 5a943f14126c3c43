//! Contract with the calling SDK. The controller only sees these traits; the
//! concrete implementation talks to an HTTP sidecar wrapping the SDK.

pub mod registry;
pub mod sidecar;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Call progress as reported by the calling SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteCallState {
    Idle,
    Ringing,
    Connecting,
    Connected,
    Hold,
}

/// One notification from a session's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Progress(RemoteCallState),
    Terminated(Option<String>),
    IncomingDtmf(Option<String>),
}

/// DTMF symbols accepted by `Session::send_dtmf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtmf {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Star,
    Pound,
}

impl Dtmf {
    pub fn symbol(self) -> char {
        match self {
            Dtmf::Zero => '0',
            Dtmf::One => '1',
            Dtmf::Two => '2',
            Dtmf::Three => '3',
            Dtmf::Four => '4',
            Dtmf::Five => '5',
            Dtmf::Six => '6',
            Dtmf::Seven => '7',
            Dtmf::Eight => '8',
            Dtmf::Nine => '9',
            Dtmf::Star => '*',
            Dtmf::Pound => '#',
        }
    }
}

impl TryFrom<char> for Dtmf {
    type Error = char;

    fn try_from(c: char) -> Result<Self, char> {
        Ok(match c {
            '0' => Dtmf::Zero,
            '1' => Dtmf::One,
            '2' => Dtmf::Two,
            '3' => Dtmf::Three,
            '4' => Dtmf::Four,
            '5' => Dtmf::Five,
            '6' => Dtmf::Six,
            '7' => Dtmf::Seven,
            '8' => Dtmf::Eight,
            '9' => Dtmf::Nine,
            '*' => Dtmf::Star,
            '#' => Dtmf::Pound,
            other => return Err(other),
        })
    }
}

/// Handle to one live call inside the calling SDK.
#[async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> &str;
    async fn terminate(&self) -> Result<(), EndpointError>;
    async fn hold(&self, on: bool) -> Result<(), EndpointError>;
    async fn mute_audio(&self, on: bool) -> Result<(), EndpointError>;
    async fn send_dtmf(&self, digit: Dtmf) -> Result<(), EndpointError>;
}

/// A session just returned by `CallEndpoint::call`, with its event stream.
pub struct PlacedCall {
    pub session: Box<dyn Session>,
    pub events: mpsc::Receiver<SessionEvent>,
}

impl std::fmt::Debug for PlacedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacedCall")
            .field("session_id", &self.session.id())
            .finish()
    }
}

#[async_trait]
pub trait CallEndpoint: Send + Sync {
    async fn login(&self) -> Result<(), EndpointError>;
    async fn call(&self, destination: &str, token: Option<&str>) -> Result<PlacedCall, EndpointError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EndpointError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Calling SDK error: {0}")]
    Api(String),
    #[error("Session {0} is no longer known to the calling SDK")]
    Closed(String),
}
