use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{call_error_response, check_auth, error_response};
use crate::call::presentation::Controls;
use crate::call::{CallState, DialedNumber};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DialpadRequest {
    /// A digit `0`-`9`, `backspace`, or `clear`.
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallRequest {
    /// Number to dial. Falls back to what was typed on the dialpad.
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DtmfRequest {
    pub digit: String,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: CallState,
    /// MM:SS
    pub elapsed: String,
    pub seconds: u64,
    /// Current dialpad contents.
    pub number: String,
    pub controls: Controls,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    state: CallState,
}

async fn status(state: &AppState) -> Response {
    let current = state.controller.state().await;
    (StatusCode::OK, Json(StatusResponse { state: current })).into_response()
}

/// POST /api/dialpad: Edit the number being typed.
pub async fn handle_dialpad(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DialpadRequest>,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    let mut dialpad = state.dialpad.lock().await;
    match req.key.as_str() {
        "backspace" => dialpad.backspace(),
        "clear" => dialpad.clear(),
        key => match key.parse::<u8>() {
            Ok(digit) if key.len() == 1 => dialpad.append(digit),
            _ => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown dialpad key: {key}"),
                )
            }
        },
    }

    let number = dialpad.value().to_string();
    (StatusCode::OK, Json(serde_json::json!({ "number": number }))).into_response()
}

/// POST /api/call: Place a call to `to`, or to the dialpad contents.
///
/// Returns once the calling SDK has accepted the call; progress after that
/// shows up in GET /api/state.
pub async fn handle_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    // An empty body dials the dialpad contents.
    let req = if body.is_empty() {
        CallRequest::default()
    } else {
        match serde_json::from_slice::<CallRequest>(&body) {
            Ok(req) => req,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    };
    let destination = match req.to {
        Some(to) => match DialedNumber::parse(&to) {
            Ok(number) => number,
            Err(e) => return call_error_response(&e),
        },
        None => state.dialpad.lock().await.value(),
    };

    tracing::info!(to = %destination, "Call requested");

    match state.controller.place_call(destination, None).await {
        Ok(()) => status(&state).await,
        Err(e) => {
            tracing::warn!("Call not placed: {e}");
            call_error_response(&e)
        }
    }
}

/// POST /api/hangup: Always succeeds; the call moves to `ending`.
pub async fn handle_hangup(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    state.controller.terminate().await;
    status(&state).await
}

pub async fn handle_hold(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    match state.controller.toggle_hold().await {
        Ok(next) => (StatusCode::OK, Json(StatusResponse { state: next })).into_response(),
        Err(e) => call_error_response(&e),
    }
}

pub async fn handle_mute(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    match state.controller.toggle_mute().await {
        Ok(next) => (StatusCode::OK, Json(StatusResponse { state: next })).into_response(),
        Err(e) => call_error_response(&e),
    }
}

pub async fn handle_dtmf(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DtmfRequest>,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    let mut chars = req.digit.chars();
    let digit = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Send exactly one keypad symbol",
            )
        }
    };

    match state.controller.send_digit(digit).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => call_error_response(&e),
    }
}

/// GET /api/state: What a UI would currently render.
pub async fn handle_state(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    let current = state.controller.state().await;
    let elapsed = state.controller.elapsed().await;
    let controls = Controls::for_state(current, state.controller.has_session().await);
    let number = state.dialpad.lock().await.value().to_string();

    (
        StatusCode::OK,
        Json(StateResponse {
            state: current,
            elapsed: elapsed.display(),
            seconds: elapsed.seconds(),
            number,
            controls,
        }),
    )
        .into_response()
}
