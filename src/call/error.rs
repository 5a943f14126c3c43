use crate::auth::TokenError;
use crate::endpoint::EndpointError;

use super::state::CallState;

/// Every way a controller operation can fail. The message of each variant is
/// what the presentation layer shows the user.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error("Enter a number to call")]
    InvalidDestination(String),
    #[error("A call is already in progress ({0})")]
    CallAlreadyActive(CallState),
    #[error("Could not authorize the call: {0}")]
    AuthenticationFailed(#[from] TokenError),
    #[error("No active call")]
    NoActiveSession,
    #[error("'{0}' is not a dialpad key")]
    InvalidDigit(char),
    #[error("Call could not be placed: {0}")]
    CallSetupFailed(EndpointError),
    #[error("Call control failed: {0}")]
    MediaControlFailed(EndpointError),
    #[error("Hang-up was not confirmed by the calling SDK: {0}")]
    EndpointTerminationError(EndpointError),
    #[error("Call was cancelled")]
    Cancelled,
}
