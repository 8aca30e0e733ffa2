use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::oauth::broker::BrokerError;
use crate::oauth::OAuthError;
use crate::session::SessionError;
use crate::workspace::WorkspaceError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("no provider configured for host {0}")]
    UnknownHost(String),

    #[error("not authenticated with provider {0}")]
    NotAuthenticated(String),

    #[error("invalid oauth state")]
    InvalidState,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl From<BrokerError> for AppError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Session(e) => AppError::Session(e),
            BrokerError::Token(e) => AppError::OAuth(e),
        }
    }
}

fn internal(e: &dyn std::fmt::Display) -> (StatusCode, &'static str, &'static str, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal_server_error",
        "internal server error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::ProviderNotFound(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "provider_not_found",
                self.to_string(),
            ),
            AppError::UnknownHost(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "unknown_host",
                self.to_string(),
            ),
            AppError::NotAuthenticated(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "not_authenticated",
                self.to_string(),
            ),
            AppError::InvalidState => (
                StatusCode::BAD_REQUEST,
                "authentication_error",
                "invalid_state",
                self.to_string(),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                msg.clone(),
            ),
            AppError::OAuth(e) => {
                tracing::warn!(error = %e, "OAuth token request failed");
                (
                    StatusCode::UNAUTHORIZED,
                    "authentication_error",
                    "oauth_failed",
                    e.to_string(),
                )
            }
            AppError::Workspace(e) => workspace_status(e),
            AppError::Session(e) => internal(e),
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

fn workspace_status(e: &WorkspaceError) -> (StatusCode, &'static str, &'static str, String) {
    let (status, error_type, code) = match e {
        e if e.is_configuration() => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "configuration_error",
            "invalid_project_config",
        ),
        WorkspaceError::BranchNotFound(_) => {
            (StatusCode::NOT_FOUND, "invalid_request_error", "branch_not_found")
        }
        WorkspaceError::NotFound(_) => {
            (StatusCode::NOT_FOUND, "invalid_request_error", "workspace_not_found")
        }
        WorkspaceError::PartiallyProvisioned { .. } => {
            (StatusCode::BAD_GATEWAY, "upstream_error", "partially_provisioned")
        }
        _ => (StatusCode::BAD_GATEWAY, "upstream_error", "upstream_failed"),
    };
    if status.is_server_error() {
        tracing::warn!(error = %e, "Workspace operation failed");
    }
    (status, error_type, code, e.to_string())
}
