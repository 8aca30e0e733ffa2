use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};

use super::oauth::provider;
use super::with_session;
use crate::errors::AppError;
use crate::oauth::broker;
use crate::oauth::registry::ProviderConfig;
use crate::oauth::TokenSource;
use crate::provider::{RepositoryProvider, User};
use crate::session::Session;
use crate::workspace::manager::WorkspaceSummary;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct CreateWorkspaceRequest {
    /// Provider host, e.g. `gitlab.example.com`.
    pub host: String,
    /// Project slug, e.g. `group/repo`.
    pub project: String,
    pub branch: Option<String>,
}

#[derive(Serialize)]
pub struct IdentityResponse {
    pub host: String,
    pub provider: String,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: String,
}

impl From<&dyn User> for UserResponse {
    fn from(user: &dyn User) -> Self {
        Self {
            username: user.username().to_string(),
            display_name: user.display_name().to_string(),
            email: user.email().to_string(),
            avatar_url: user.avatar_url().to_string(),
        }
    }
}

// ── Session helpers ──────────────────────────────────────────

/// A provider client authenticated with the session's token.
struct Connected {
    source: Arc<TokenSource>,
    repo: Box<dyn RepositoryProvider>,
}

fn connect(
    state: &AppState,
    session: &Session,
    provider: &ProviderConfig,
) -> Result<Option<Connected>, AppError> {
    let source = match broker::read(session, provider, &state.http)? {
        Some(source) => source,
        None => return Ok(None),
    };
    let repo = provider.repository_provider(&state.http, source.clone());
    Ok(Some(Connected { source, repo }))
}

/// Caller identity for `conn`. A failed lookup counts as not authenticated.
async fn identify(provider: &ProviderConfig, conn: &Connected) -> Result<Box<dyn User>, AppError> {
    conn.repo.self_user().await.map_err(|e| {
        tracing::warn!(provider = %provider.id, error = %e, "Failed to fetch user identity");
        AppError::NotAuthenticated(provider.id.clone())
    })
}

fn require(
    state: &AppState,
    session: &Session,
    provider: &ProviderConfig,
) -> Result<Connected, AppError> {
    connect(state, session, provider)?.ok_or_else(|| AppError::NotAuthenticated(provider.id.clone()))
}

/// Write a refreshed token back so the refresh outlives this request.
async fn keep_refreshed(session: &mut Session, provider_id: &str, source: &TokenSource) {
    if !source.was_refreshed() {
        return;
    }
    if let Err(e) = broker::save(session, provider_id, source).await {
        tracing::warn!(provider = %provider_id, error = %e, "Failed to store refreshed token");
    }
}

// ── Handlers ─────────────────────────────────────────────────

/// Identities of the caller across every provider they are logged in to.
pub async fn get_self(State(state): State<Arc<AppState>>, mut session: Session) -> Response {
    let result = identities(&state, &mut session).await;
    with_session(&state, &session, result)
}

async fn identities(
    state: &AppState,
    session: &mut Session,
) -> Result<Json<Vec<IdentityResponse>>, AppError> {
    let mut identities = Vec::new();

    for provider in state.providers.iter() {
        let Some(conn) = connect(state, session, provider)? else {
            continue;
        };
        match conn.repo.self_user().await {
            Ok(user) => identities.push(IdentityResponse {
                host: provider.host.clone(),
                provider: provider.id.clone(),
                user: UserResponse::from(user.as_ref()),
            }),
            Err(e) => {
                tracing::warn!(provider = %provider.id, error = %e, "Skipping provider identity");
            }
        }
        keep_refreshed(session, &provider.id, &conn.source).await;
    }

    Ok(Json(identities))
}

pub async fn create_workspace(
    State(state): State<Arc<AppState>>,
    mut session: Session,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Response {
    let result = create(&state, &mut session, &req).await;
    with_session(&state, &session, result)
}

async fn create(
    state: &AppState,
    session: &mut Session,
    req: &CreateWorkspaceRequest,
) -> Result<Json<WorkspaceSummary>, AppError> {
    let provider = state
        .providers
        .by_host(&req.host)
        .ok_or_else(|| AppError::UnknownHost(req.host.clone()))?;
    if req.project.is_empty() {
        return Err(AppError::BadRequest("project must not be empty".into()));
    }

    let conn = require(state, session, provider)?;
    let result = create_as_caller(state, provider, &conn, req).await;
    keep_refreshed(session, &provider.id, &conn.source).await;
    result.map(Json)
}

async fn create_as_caller(
    state: &AppState,
    provider: &ProviderConfig,
    conn: &Connected,
    req: &CreateWorkspaceRequest,
) -> Result<WorkspaceSummary, AppError> {
    let user = identify(provider, conn).await?;
    let access_token = conn.source.access_token().await?;

    Ok(state
        .workspaces
        .create(
            conn.repo.as_ref(),
            &req.project,
            req.branch.as_deref(),
            user.as_ref(),
            &access_token,
        )
        .await?)
}

/// Workspaces per provider id. Providers without workspaces, or whose
/// lookup fails, are left out.
pub async fn list_workspaces(State(state): State<Arc<AppState>>, mut session: Session) -> Response {
    let result = list(&state, &mut session).await;
    with_session(&state, &session, result)
}

async fn list(
    state: &AppState,
    session: &mut Session,
) -> Result<Json<BTreeMap<String, Vec<WorkspaceSummary>>>, AppError> {
    let mut result = BTreeMap::new();

    for provider in state.providers.iter() {
        let Some(conn) = connect(state, session, provider)? else {
            continue;
        };
        let user = match conn.repo.self_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(provider = %provider.id, error = %e, "Skipping provider workspaces");
                keep_refreshed(session, &provider.id, &conn.source).await;
                continue;
            }
        };
        match state.workspaces.list(user.as_ref()).await {
            Ok(list) if !list.is_empty() => {
                result.insert(provider.id.clone(), list);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(provider = %provider.id, error = %e, "Failed to list workspaces");
            }
        }
        keep_refreshed(session, &provider.id, &conn.source).await;
    }

    Ok(Json(result))
}

pub async fn delete_workspace(
    State(state): State<Arc<AppState>>,
    Path((provider_id, name)): Path<(String, String)>,
    mut session: Session,
) -> Response {
    let result = delete(&state, &mut session, &provider_id, &name).await;
    with_session(&state, &session, result)
}

async fn delete(
    state: &AppState,
    session: &mut Session,
    provider_id: &str,
    name: &str,
) -> Result<StatusCode, AppError> {
    let provider = provider(state, provider_id)?;
    let conn = require(state, session, provider)?;

    let result = match identify(provider, &conn).await {
        Ok(user) => state.workspaces.delete(name, user.as_ref()).await.map_err(AppError::from),
        Err(e) => Err(e),
    };

    keep_refreshed(session, &provider.id, &conn.source).await;
    result.map(|()| StatusCode::NO_CONTENT)
}
