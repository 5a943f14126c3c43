use serde::Serialize;

/// Presentation state of the one call a controller owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Idle,
    Ringing,
    Connecting,
    Connected,
    Held,
    Muted,
    Ending,
}

impl CallState {
    /// States in which a call attempt or a live session exists.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CallState::Ringing
                | CallState::Connecting
                | CallState::Connected
                | CallState::Held
                | CallState::Muted
        )
    }

    /// States in which hold, mute and DTMF act on the session.
    pub fn is_in_call(self) -> bool {
        matches!(self, CallState::Connected | CallState::Held | CallState::Muted)
    }

    /// Agent status published to the presence collaborator.
    pub fn presence_label(self) -> &'static str {
        match self {
            CallState::Idle => "Idle",
            CallState::Ringing => "Ringing",
            CallState::Connecting => "Connecting",
            CallState::Connected => "In-Call",
            CallState::Held => "On-Hold",
            CallState::Muted => "Muted",
            CallState::Ending => "Ending",
        }
    }

    /// Whether `self -> next` is an edge of the call state machine.
    ///
    /// Held and Muted are derived from two independent media flags, so moving
    /// directly between them (e.g. holding a muted call) is an edge too.
    pub fn can_transition_to(self, next: CallState) -> bool {
        use CallState::*;
        match (self, next) {
            (Idle, Ringing) => true,
            // terminate() with nothing to end still renders Ending
            (Idle, Ending) => true,
            (Ringing, Connecting) => true,
            (Ringing | Connecting, Connected) => true,
            (Connected, Held | Muted) => true,
            (Held | Muted, Connected) => true,
            (Held, Muted) | (Muted, Held) => true,
            (Ringing | Connecting | Connected | Held | Muted, Ending) => true,
            // failed attempt rolls back
            (Ringing, Idle) => true,
            (Ending, Idle) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Ringing => "ringing",
            CallState::Connecting => "connecting",
            CallState::Connected => "connected",
            CallState::Held => "held",
            CallState::Muted => "muted",
            CallState::Ending => "ending",
        };
        f.write_str(s)
    }
}

/// Whole seconds a call has been connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ElapsedTime(pub u64);

impl ElapsedTime {
    pub fn seconds(self) -> u64 {
        self.0
    }

    /// `MM:SS`, minutes not wrapped at the hour.
    pub fn display(self) -> String {
        format!("{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}
