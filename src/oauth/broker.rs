//! Per-session, per-provider token storage.
//!
//! Tokens live in the session under `{providerId}_token`; the OAuth2 `state`
//! nonce for an in-flight authorization lives under `{providerId}_state` and is
//! consumed on first use. Nothing here touches the cookie itself: callers
//! persist the session after mutating it.

use std::sync::Arc;

use super::registry::ProviderConfig;
use super::{new_state, OAuthError, Token, TokenSource};
use crate::session::{Session, SessionError, SessionKey};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to resolve token: {0}")]
    Token(#[from] OAuthError),
}

fn token_key(provider_id: &str) -> SessionKey<Token> {
    SessionKey::new(format!("{}_token", provider_id))
}

fn state_key(provider_id: &str) -> SessionKey<String> {
    SessionKey::new(format!("{}_state", provider_id))
}

/// Resolve the current token from `source` and store it for `provider_id`.
pub async fn save(
    session: &mut Session,
    provider_id: &str,
    source: &TokenSource,
) -> Result<(), BrokerError> {
    let token = source.token().await?;
    session.set(&token_key(provider_id), &token)?;
    Ok(())
}

/// Token source for `provider`, or `None` if this session never logged in to it.
pub fn read(
    session: &Session,
    provider: &ProviderConfig,
    http: &reqwest::Client,
) -> Result<Option<Arc<TokenSource>>, SessionError> {
    let token = session.get(&token_key(&provider.id))?;
    Ok(token.map(|token| {
        Arc::new(TokenSource::new(provider.oauth.clone(), http.clone(), token))
    }))
}

/// Forget the token for `provider`. Idempotent.
pub fn remove(session: &mut Session, provider: &ProviderConfig) {
    session.remove(&token_key(&provider.id));
}

/// Generate and store a fresh `state` nonce for an authorization request.
pub fn begin_authorization(
    session: &mut Session,
    provider: &ProviderConfig,
) -> Result<String, SessionError> {
    let state = new_state();
    session.set(&state_key(&provider.id), &state)?;
    Ok(state)
}

/// Check the callback's `state` against the stored nonce, consuming it either way.
///
/// This is a plain string comparison, not a constant-time one.
pub fn verify_state(
    session: &mut Session,
    provider: &ProviderConfig,
    received: Option<&str>,
) -> Result<bool, SessionError> {
    let expected = session.take(&state_key(&provider.id))?;
    Ok(match (expected, received) {
        (Some(expected), Some(received)) => !received.is_empty() && expected == received,
        _ => false,
    })
}
