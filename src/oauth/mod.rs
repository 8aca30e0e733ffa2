//! OAuth2 authorization-code client for source-control providers.
//!
//! Covers the three pieces the workspace flow needs:
//! 1. Building the provider's authorize URL (with a session-bound `state` nonce)
//! 2. Exchanging the callback `code` for a [`Token`]
//! 3. A refreshing [`TokenSource`] that transparently renews expired tokens
//!
//! Client credentials are sent in the form body, which every supported
//! provider accepts.

pub mod broker;
pub mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_DELTA_SECS: i64 = 10;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("oauth2: token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("oauth2: cannot fetch token: {status}\nResponse: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("oauth2: server response missing access_token")]
    MissingAccessToken,

    #[error("oauth2: token expired and refresh token is not set")]
    RefreshTokenMissing,
}

// ── Token ────────────────────────────────────────────────────

/// An OAuth2 token as stored in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// A token without expiry never expires.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_DELTA_SECS) < Utc::now(),
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

/// Token endpoint response body (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self) -> Result<Token, OAuthError> {
        if self.access_token.is_empty() {
            return Err(OAuthError::MissingAccessToken);
        }
        Ok(Token {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

// ── Client configuration ─────────────────────────────────────

/// Resolved OAuth2 client settings for one provider.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Url,
    pub token_url: Url,
    pub redirect_url: Url,
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    /// URL the browser is sent to in order to start the authorization-code flow.
    pub fn authorize_url(&self, state: &str) -> Url {
        let mut url = self.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", self.redirect_url.as_str())
                .append_pair("response_type", "code");
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query.append_pair("state", state);
        }
        url
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange(&self, http: &reqwest::Client, code: &str) -> Result<Token, OAuthError> {
        self.request_token(
            http,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_url.as_str()),
            ],
        )
        .await
    }

    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        refresh_token: &str,
    ) -> Result<Token, OAuthError> {
        self.request_token(
            http,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn request_token(
        &self,
        http: &reqwest::Client,
        params: &[(&str, &str)],
    ) -> Result<Token, OAuthError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.client_id.as_str()));
        form.push(("client_secret", self.client_secret.as_str()));

        let resp = http
            .post(self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OAuthError::Status { status, body });
        }

        resp.json::<TokenResponse>().await?.into_token()
    }
}

// ── Token source ─────────────────────────────────────────────

/// Hands out a valid access token, refreshing it through the provider's
/// token endpoint once it has expired.
#[derive(Debug)]
pub struct TokenSource {
    config: Arc<OAuthClientConfig>,
    http: reqwest::Client,
    current: Mutex<Token>,
    refreshed: AtomicBool,
}

impl TokenSource {
    pub fn new(config: Arc<OAuthClientConfig>, http: reqwest::Client, token: Token) -> Self {
        Self {
            config,
            http,
            current: Mutex::new(token),
            refreshed: AtomicBool::new(false),
        }
    }

    pub async fn token(&self) -> Result<Token, OAuthError> {
        let mut current = self.current.lock().await;
        if current.is_valid() {
            return Ok(current.clone());
        }

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or(OAuthError::RefreshTokenMissing)?;

        tracing::debug!(token_url = %self.config.token_url, "Refreshing expired OAuth2 token");
        let mut fresh = self.config.refresh(&self.http, &refresh_token).await?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }

        *current = fresh.clone();
        self.refreshed.store(true, Ordering::Relaxed);
        Ok(fresh)
    }

    pub async fn access_token(&self) -> Result<String, OAuthError> {
        Ok(self.token().await?.access_token)
    }

    /// Whether [`TokenSource::token`] had to refresh since this source was created.
    pub fn was_refreshed(&self) -> bool {
        self.refreshed.load(Ordering::Relaxed)
    }
}

/// Random hex nonce used as the OAuth2 `state` parameter.
pub fn new_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── Tests ────────────────────────────────────────────────────
