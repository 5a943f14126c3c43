use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use super::registry::SessionRegistry;
use super::{CallEndpoint, Dtmf, EndpointError, PlacedCall, Session};
use crate::config::{AccountConfig, SidecarConfig};

/// HTTP client for the calling-SDK sidecar. Control requests go out over
/// REST; the sidecar posts progress back to `/sidecar/events`, which the
/// shared `SessionRegistry` routes to each session's event channel.
pub struct SidecarEndpoint {
    client: reqwest::Client,
    timeout: Duration,
    base_url: String,
    account: AccountConfig,
    event_buffer: usize,
    registry: SessionRegistry,
}

#[derive(Deserialize)]
struct CallCreated {
    session_id: String,
}

impl SidecarEndpoint {
    pub fn new(sidecar: &SidecarConfig, account: &AccountConfig, registry: SessionRegistry) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: sidecar.request_timeout(),
            base_url: sidecar.url.trim_end_matches('/').to_string(),
            account: account.clone(),
            event_buffer: sidecar.event_buffer.max(1),
            registry,
        }
    }
}

#[async_trait]
impl CallEndpoint for SidecarEndpoint {
    async fn login(&self) -> Result<(), EndpointError> {
        let body = json!({
            "username": self.account.username,
            "display_name": self.account.display_name,
            "password": self.account.password,
        });
        post(&self.client, self.timeout, &format!("{}/login", self.base_url), &body).await?;
        tracing::debug!(username = %self.account.username, "Logged in to calling SDK");
        Ok(())
    }

    async fn call(&self, destination: &str, token: Option<&str>) -> Result<PlacedCall, EndpointError> {
        let body = json!({ "to": destination, "token": token });
        let resp = post(&self.client, self.timeout, &format!("{}/calls", self.base_url), &body).await?;

        let created: CallCreated = resp
            .json()
            .await
            .map_err(|e| EndpointError::Api(format!("Bad call response: {e}")))?;

        // Register before returning so no early progress event is lost.
        let (events_tx, events) = mpsc::channel(self.event_buffer);
        self.registry
            .register(created.session_id.clone(), events_tx)
            .await;

        tracing::info!(to = destination, session_id = %created.session_id, "Call placed");

        Ok(PlacedCall {
            session: Box::new(SidecarSession {
                client: self.client.clone(),
                timeout: self.timeout,
                url: format!("{}/calls/{}", self.base_url, created.session_id),
                id: created.session_id,
                registry: self.registry.clone(),
            }),
            events,
        })
    }
}

struct SidecarSession {
    client: reqwest::Client,
    timeout: Duration,
    url: String,
    id: String,
    registry: SessionRegistry,
}

#[async_trait]
impl Session for SidecarSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn terminate(&self) -> Result<(), EndpointError> {
        let result = self.control("terminate", json!({})).await;
        // The session is gone from our side whatever the sidecar says.
        self.registry.deregister(&self.id).await;
        result
    }

    async fn hold(&self, on: bool) -> Result<(), EndpointError> {
        self.control("hold", json!({ "on": on })).await
    }

    async fn mute_audio(&self, on: bool) -> Result<(), EndpointError> {
        self.control("mute", json!({ "on": on })).await
    }

    async fn send_dtmf(&self, digit: Dtmf) -> Result<(), EndpointError> {
        self.control("dtmf", json!({ "digit": digit.symbol().to_string() }))
            .await
    }
}

impl SidecarSession {
    /// POST one session operation. A 404 means the sidecar already dropped
    /// the session.
    async fn control(&self, op: &str, body: serde_json::Value) -> Result<(), EndpointError> {
        let resp = self
            .client
            .post(format!("{}/{op}", self.url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| EndpointError::Request(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EndpointError::Closed(self.id.clone()));
        }
        check(resp).await.map(|_| ())
    }
}

/// POST `body` as JSON. A sidecar that does not answer within `timeout`
/// is a request failure.
async fn post(
    client: &reqwest::Client,
    timeout: Duration,
    url: &str,
    body: &serde_json::Value,
) -> Result<reqwest::Response, EndpointError> {
    let resp = client
        .post(url)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| EndpointError::Request(e.to_string()))?;

    check(resp).await
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, EndpointError> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(EndpointError::Api(format!("{status}: {body}")));
    }

    Ok(resp)
}
