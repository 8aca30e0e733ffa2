use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{found, session_headers, with_session};
use crate::errors::AppError;
use crate::oauth::registry::ProviderConfig;
use crate::oauth::{broker, TokenSource};
use crate::session::Session;
use crate::AppState;

#[derive(Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub host: String,
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

pub(crate) fn provider<'a>(state: &'a AppState, id: &str) -> Result<&'a ProviderConfig, AppError> {
    state
        .providers
        .by_id(id)
        .ok_or_else(|| AppError::ProviderNotFound(id.to_string()))
}

pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderInfo>> {
    Json(
        state
            .providers
            .iter()
            .map(|p| ProviderInfo {
                id: p.id.clone(),
                host: p.host.clone(),
            })
            .collect(),
    )
}

/// Start the authorization-code flow: store a `state` nonce and send the
/// browser to the provider.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let provider = provider(&state, &id)?;
    let nonce = broker::begin_authorization(&mut session, provider)?;
    let url = provider.oauth.authorize_url(&nonce);

    tracing::debug!(provider = %id, "Redirecting to OAuth2 authorization endpoint");
    found(url.as_str(), session_headers(&state, &session)?)
}

/// Provider callback: check the nonce, exchange the code and keep the token.
///
/// Once the nonce is consumed, every response carries the updated session,
/// errors included.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<CallbackParams>,
    mut session: Session,
) -> Response {
    let result = complete_login(&state, &id, params, &mut session).await;
    with_session(&state, &session, result)
}

async fn complete_login(
    state: &AppState,
    id: &str,
    params: CallbackParams,
    session: &mut Session,
) -> Result<Response, AppError> {
    let provider = provider(state, id)?;

    if !broker::verify_state(session, provider, params.state.as_deref())? {
        tracing::warn!(provider = %id, "OAuth2 callback with missing or mismatched state");
        return Err(AppError::InvalidState);
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing authorization code".into()))?;

    let token = provider.oauth.exchange(&state.http, &code).await?;
    let source = TokenSource::new(provider.oauth.clone(), state.http.clone(), token);
    broker::save(session, &provider.id, &source).await?;

    tracing::info!(provider = %id, "OAuth2 login completed");
    found("/", HeaderMap::new())
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let provider = provider(&state, &id)?;
    broker::remove(&mut session, provider);
    found("/", session_headers(&state, &session)?)
}
