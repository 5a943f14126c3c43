use std::collections::HashMap;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use super::{call_error_response, check_auth, error_response};
use crate::call::{IncomingCallRequest, IncomingDisposition};
use crate::AppState;

/// Push payloads are string maps, but relays sometimes send booleans or
/// numbers; everything is flattened to its text form.
fn flatten(payload: HashMap<String, Value>) -> HashMap<String, String> {
    payload
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect()
}

/// POST /api/incoming: A push notification announcing a call.
///
/// Direct calls are placed immediately. Others are held as pending until
/// accepted or declined; a newer push replaces an older pending one.
pub async fn handle_incoming(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<HashMap<String, Value>>,
) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    let request = match IncomingCallRequest::from_map(&flatten(payload)) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!("Dropping incoming call push: {e}");
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    if !request.direct {
        let mut pending = state.pending_incoming.lock().await;
        if let Some(previous) = pending.replace(request.clone()) {
            tracing::info!(from = %previous.from_number, "Replacing unanswered incoming call");
        }
    }

    match state.controller.handle_incoming(request).await {
        Ok(disposition) => disposition_response(disposition),
        Err(e) => call_error_response(&e),
    }
}

/// POST /api/incoming/accept: Answer the pending call by dialing back.
///
/// If the call cannot be placed (e.g. the previous call is still ending),
/// the request stays pending so it can be accepted again.
pub async fn handle_accept(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    let Some(request) = state.pending_incoming.lock().await.take() else {
        return error_response(StatusCode::NOT_FOUND, "No incoming call to accept");
    };

    tracing::info!(from = %request.from_number, "Incoming call accepted");
    match state.controller.handle_incoming(request.clone().accepted()).await {
        Ok(disposition) => disposition_response(disposition),
        Err(e) => {
            let mut pending = state.pending_incoming.lock().await;
            if pending.is_none() {
                *pending = Some(request);
            } else {
                tracing::info!(from = %request.from_number, "Accept failed and a newer call is pending");
            }
            call_error_response(&e)
        }
    }
}

/// POST /api/incoming/decline: Drop the pending call.
pub async fn handle_decline(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&headers, &state.config.api.token) {
        return resp;
    }

    match state.pending_incoming.lock().await.take() {
        Some(request) => {
            tracing::info!(from = %request.from_number, "Incoming call declined");
            StatusCode::NO_CONTENT.into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "No incoming call to decline"),
    }
}

fn disposition_response(disposition: IncomingDisposition) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "disposition": disposition })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::call::CallState;
    use crate::testing::{self, FakeEndpoint, FakeTokens, RecordingPresence};

    const TOKEN: &str = "api-secret";

    async fn start() -> (String, Arc<FakeTokens>, Arc<FakeEndpoint>, AppState) {
        let tokens = Arc::new(FakeTokens::ok("fetched"));
        let endpoint = Arc::new(FakeEndpoint::new());
        let mut config = testing::test_config();
        config.settle_delay_ms = 50;
        let controller = testing::controller_with(
            config,
            tokens.clone(),
            endpoint.clone(),
            Arc::new(RecordingPresence::default()),
        );
        let state = testing::app_state(controller, TOKEN);
        let base = testing::serve(crate::router(state.clone())).await;
        (base, tokens, endpoint, state)
    }

    async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
        let resp = reqwest::Client::new()
            .post(format!("{base}{path}"))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    #[test]
    fn flatten_stringifies_scalars() {
        let flat = flatten(HashMap::from([
            ("isDirectCall".to_string(), json!(true)),
            ("fromNo".to_string(), json!("+15550100")),
            ("token".to_string(), Value::Null),
        ]));
        assert_eq!(flat["isDirectCall"], "true");
        assert_eq!(flat["fromNo"], "+15550100");
        assert!(!flat.contains_key("token"));
    }

    #[tokio::test]
    async fn direct_push_is_placed_with_its_token() {
        let (base, tokens, endpoint, state) = start().await;
        let (status, body) = post(
            &base,
            "/api/incoming",
            json!({ "fromNo": "+15550100", "token": "pre", "isDirectCall": true }),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["disposition"], "placed");
        assert_eq!(endpoint.entries(), vec!["login", "call +15550100 pre"]);
        assert_eq!(tokens.fetches.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(state.pending_incoming.lock().await.is_none());
    }

    #[tokio::test]
    async fn push_without_caller_is_rejected() {
        let (base, _, endpoint, _) = start().await;
        let (status, _) = post(&base, "/api/incoming", json!({ "toNo": "+1" })).await;
        assert_eq!(status, 400);
        assert!(endpoint.entries().is_empty());
    }

    #[tokio::test]
    async fn non_direct_push_waits_for_accept() {
        let (base, _, endpoint, state) = start().await;
        let (status, body) = post(&base, "/api/incoming", json!({ "fromNo": "15550100" })).await;
        assert_eq!(status, 200);
        assert_eq!(body["disposition"], "presented");
        assert!(endpoint.entries().is_empty());
        assert_eq!(state.controller.state().await, CallState::Idle);

        let (status, body) = post(&base, "/api/incoming/accept", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(body["disposition"], "placed");
        assert_eq!(endpoint.entries(), vec!["login", "call +15550100 fetched"]);

        let (status, _) = post(&base, "/api/incoming/accept", json!({})).await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn failed_accept_keeps_the_call_pending() {
        let (base, _, endpoint, state) = start().await;
        state.controller.terminate().await;
        assert_eq!(state.controller.state().await, CallState::Ending);

        post(&base, "/api/incoming", json!({ "fromNo": "15550100" })).await;
        let (status, _) = post(&base, "/api/incoming/accept", json!({})).await;
        assert_eq!(status, 409);
        assert!(state.pending_incoming.lock().await.is_some());

        testing::wait_for_state(&state.controller, CallState::Idle).await;
        let (status, body) = post(&base, "/api/incoming/accept", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(body["disposition"], "placed");
        assert_eq!(endpoint.entries(), vec!["login", "call +15550100 fetched"]);
        assert!(state.pending_incoming.lock().await.is_none());
    }

    #[tokio::test]
    async fn decline_drops_the_pending_call() {
        let (base, _, endpoint, _) = start().await;
        post(&base, "/api/incoming", json!({ "fromNo": "15550100" })).await;

        let (status, _) = post(&base, "/api/incoming/decline", json!({})).await;
        assert_eq!(status, 204);
        let (status, _) = post(&base, "/api/incoming/decline", json!({})).await;
        assert_eq!(status, 404);
        assert!(endpoint.entries().is_empty());
    }
}
