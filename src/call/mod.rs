//! Call lifecycle: dialpad input, the state machine, the session event
//! dispatcher and the controller that owns them.

pub mod controller;
pub mod dialpad;
pub mod dispatcher;
pub mod error;
pub mod incoming;
pub mod presentation;
pub mod state;
pub mod timer;


pub use controller::{CallController, Collaborators};
pub use dialpad::{DialedNumber, DialpadAccumulator};
pub use error::CallError;
pub use incoming::{IncomingCallRequest, IncomingDisposition};
pub use presentation::Presentation;
pub use state::CallState;
