use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::AuthConfig;

/// Short-lived bearer credential for one call attempt. Never persisted.
#[derive(Clone)]
pub struct AuthToken {
    access_token: String,
    pub token_id: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_id: None,
            token_type: None,
            expires_at: None,
        }
    }

    #[cfg(test)]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn bearer(&self) -> &str {
        &self.access_token
    }

    /// Usable for at least `margin` more. Tokens without an expiry hint never are.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        match (self.expires_at, now.checked_add_signed(margin)) {
            (Some(at), Some(deadline)) => deadline < at,
            _ => false,
        }
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"<redacted>")
            .field("token_id", &self.token_id)
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<AuthToken, TokenError>;
}

/// OAuth client-credentials response body.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    access_token_id: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
}

/// Some token servers send `expires_in` as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(i64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Option<i64> {
        match self {
            ExpiresIn::Seconds(s) => Some(*s),
            ExpiresIn::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl TokenResponse {
    fn into_token(self, received_at: DateTime<Utc>) -> AuthToken {
        // Out-of-range lifetimes are treated as unknown.
        let expires_at = self
            .expires_in
            .as_ref()
            .and_then(ExpiresIn::seconds)
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| received_at.checked_add_signed(lifetime));

        AuthToken {
            access_token: self.access_token,
            token_id: self.access_token_id,
            token_type: self.token_type,
            expires_at,
        }
    }
}

/// Exchanges client credentials for a bearer token over HTTP.
pub struct HttpTokenProvider {
    client: reqwest::Client,
    url: String,
    user: String,
    pass: String,
    timeout: Duration,
}

impl HttpTokenProvider {
    pub fn new(auth: &AuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: auth.url.clone(),
            user: auth.user.clone(),
            pass: auth.pass.clone(),
            timeout: auth.request_timeout(),
        }
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> Result<AuthToken, TokenError> {
        let params = [("grant_type", "client_credentials")];

        let resp = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .form(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| TokenError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(url = %self.url, status, "Token request rejected");
            return Err(TokenError::Rejected { status, body });
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| TokenError::Parse(e.to_string()))?;

        if body.access_token.is_empty() {
            return Err(TokenError::Parse("empty access_token".into()));
        }

        let token = body.into_token(Utc::now());
        tracing::debug!(token_id = ?token.token_id, expires_at = ?token.expires_at, "Token issued");
        Ok(token)
    }
}

/// Reuses a previously issued token until it is within `margin` of expiry.
pub struct CachedTokenProvider {
    inner: Arc<dyn TokenProvider>,
    /// `None` when the configured margin is out of range: never reuse.
    margin: Option<TimeDelta>,
    cached: Mutex<Option<AuthToken>>,
}

impl CachedTokenProvider {
    pub fn new(inner: Arc<dyn TokenProvider>, refresh_margin_secs: u64) -> Self {
        Self {
            inner,
            margin: i64::try_from(refresh_margin_secs)
                .ok()
                .and_then(TimeDelta::try_seconds),
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn fetch_token(&self) -> Result<AuthToken, TokenError> {
        let mut cached = self.cached.lock().await;
        if let (Some(token), Some(margin)) = (cached.as_ref(), self.margin) {
            if token.is_fresh(Utc::now(), margin) {
                tracing::debug!(token_id = ?token.token_id, "Reusing cached token");
                return Ok(token.clone());
            }
        }

        let token = self.inner.fetch_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Build the provider described by `[auth]`.
pub fn provider_from_config(auth: &AuthConfig) -> Arc<dyn TokenProvider> {
    let http: Arc<dyn TokenProvider> = Arc::new(HttpTokenProvider::new(auth));
    if auth.cache_tokens {
        Arc::new(CachedTokenProvider::new(http, auth.refresh_margin_secs))
    } else {
        http
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenError {
    #[error("Token request failed: {0}")]
    Network(String),
    #[error("Token server rejected credentials ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Malformed token response: {0}")]
    Parse(String),
}
