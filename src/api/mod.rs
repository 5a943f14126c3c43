pub mod calls;
pub mod incoming;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::call::CallError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Map a controller failure onto an HTTP status.
pub fn call_error_response(err: &CallError) -> Response {
    let status = match err {
        CallError::InvalidDestination(_) | CallError::InvalidDigit(_) => StatusCode::BAD_REQUEST,
        CallError::CallAlreadyActive(_) | CallError::NoActiveSession | CallError::Cancelled => {
            StatusCode::CONFLICT
        }
        CallError::AuthenticationFailed(_)
        | CallError::CallSetupFailed(_)
        | CallError::MediaControlFailed(_)
        | CallError::EndpointTerminationError(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, err.to_string())
}

#[allow(clippy::result_large_err)]
pub fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), Response> {
    if expected_token.is_empty() {
        tracing::warn!("API token not configured, rejecting request");
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "API token not configured",
        ));
    }

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected_token => Ok(()),
        _ => {
            tracing::warn!("Unauthorized API request");
            Err(error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid or missing bearer token",
            ))
        }
    }
}
