use serde::Serialize;

use super::incoming::IncomingCallRequest;
use super::state::{CallState, ElapsedTime};

/// Which controls the presentation layer should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub dial: bool,
    pub hang_up: bool,
    pub hold: bool,
    pub mute: bool,
    pub dtmf: bool,
}

impl Controls {
    pub fn for_state(state: CallState, has_session: bool) -> Self {
        // Mirrors what toggle_hold/toggle_mute/send_digit accept.
        let media = has_session && state.is_in_call();
        Self {
            dial: state == CallState::Idle,
            hang_up: state.is_active(),
            hold: media,
            mute: media,
            dtmf: media,
        }
    }
}

/// Side-effect commands rendered by whatever presents the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Presentation {
    State(CallState),
    Controls(Controls),
    TimerStarted,
    TimerStopped,
    Elapsed(ElapsedTime),
    Notice(String),
    IncomingCall(IncomingCallRequest),
}
