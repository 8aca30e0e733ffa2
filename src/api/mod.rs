use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header::LOCATION, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::session::Session;
use crate::AppState;

pub mod handlers;
pub mod oauth;

/// Full HTTP surface: OAuth flow, workspace API, health check and the
/// static frontend.
pub fn router(state: Arc<AppState>) -> Router {
    let frontend = state.config.server.frontend_dir.clone();

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/oauth", oauth_router())
        .nest("/api/v1", api_router())
        .nest_service("/assets", ServeDir::new(frontend.join("assets")))
        .route_service("/favicon.ico", ServeFile::new(frontend.join("favicon.ico")))
        .route_service("/", ServeFile::new(frontend.join("index.html")))
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

/// OAuth2 authorization-code flow, mounted under `/oauth`.
pub fn oauth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", get(oauth::list_providers))
        .route("/auth/:id", get(oauth::authorize))
        .route("/redirect/:id", get(oauth::redirect))
        .route("/logout/:id", get(oauth::logout))
}

/// Identity and workspace API, mounted under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/self", get(handlers::get_self))
        .route(
            "/workspaces",
            get(handlers::list_workspaces).post(handlers::create_workspace),
        )
        .route(
            "/workspaces/:provider/:name",
            delete(handlers::delete_workspace),
        )
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.sessions.load(&parts.headers))
    }
}

/// `Set-Cookie` for a session the handler changed; empty otherwise.
pub(crate) fn session_headers(state: &AppState, session: &Session) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();
    if session.is_modified() {
        let (name, value) = state.sessions.cookie(session)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Render `result` with the session's `Set-Cookie`, error responses included.
pub(crate) fn with_session<T: IntoResponse>(
    state: &AppState,
    session: &Session,
    result: Result<T, AppError>,
) -> Response {
    match session_headers(state, session) {
        Ok(headers) => (headers, result).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 302 to `location`, carrying any session cookie.
pub(crate) fn found(location: &str, mut headers: HeaderMap) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| AppError::BadRequest(format!("invalid redirect location: {}", location)))?;
    headers.insert(LOCATION, value);
    Ok((StatusCode::FOUND, headers).into_response())
}

/// Middleware: tags every response with a fresh `x-request-id`.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: response hardening headers.
async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
