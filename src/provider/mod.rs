pub mod gitlab;

use async_trait::async_trait;
use thiserror::Error;

use crate::oauth::OAuthError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to get response: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid status code: {status} ({url})")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("failed to obtain access token: {0}")]
    Token(#[from] OAuthError),

    #[error("failed to build request url: {0}")]
    Url(#[from] url::ParseError),
}

/// REST capabilities the workspace flow needs from a source-control backend.
///
/// A 404 from a branch lookup or a file fetch means "does not exist" and is
/// reported as `false` / `None`, never as an error.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    /// The user the access token belongs to.
    async fn self_user(&self) -> Result<Box<dyn User>, ProviderError>;

    async fn project(&self, slug: &str) -> Result<Box<dyn Project>, ProviderError>;

    async fn branch_exists(&self, slug: &str, branch: &str) -> Result<bool, ProviderError>;

    /// Raw file contents at `git_ref`.
    async fn file(
        &self,
        slug: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError>;
}

pub trait User: Send + Sync {
    fn username(&self) -> &str;
    fn display_name(&self) -> &str;
    fn email(&self) -> &str;
    fn avatar_url(&self) -> &str;
    fn is_admin(&self) -> bool;
}

pub trait Project: Send + Sync {
    /// Namespaced project path, e.g. `group/repo`.
    fn full_name(&self) -> &str;
    fn http_clone_url(&self) -> &str;
    fn default_branch(&self) -> &str;
}
