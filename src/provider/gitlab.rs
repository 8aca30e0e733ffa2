//! GitLab REST API (v4) client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{Project, ProviderError, RepositoryProvider, User};
use crate::oauth::TokenSource;

pub struct GitlabApi {
    base_url: Url,
    http: reqwest::Client,
    source: Arc<TokenSource>,
}

impl GitlabApi {
    pub fn new(base_url: Url, http: reqwest::Client, source: Arc<TokenSource>) -> Self {
        Self {
            base_url,
            http,
            source,
        }
    }

    fn api_url(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.base_url.join(&format!("/api/v4{}", path))?)
    }

    /// GET `url`; `Ok(None)` on 404, error on any other non-200 status.
    async fn get(&self, url: Url) -> Result<Option<reqwest::Response>, ProviderError> {
        let token = self.source.access_token().await?;
        let resp = self.http.get(url.clone()).bearer_auth(token).send().await?;

        match resp.status() {
            StatusCode::OK => Ok(Some(resp)),
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                tracing::warn!(url = %url, status = %status, "GitLab API request failed");
                Err(ProviderError::Status {
                    status,
                    url: url.to_string(),
                })
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ProviderError> {
        match self.get(url.clone()).await? {
            Some(resp) => Ok(resp.json().await?),
            None => Err(ProviderError::Status {
                status: StatusCode::NOT_FOUND,
                url: url.to_string(),
            }),
        }
    }
}

fn escape(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[async_trait]
impl RepositoryProvider for GitlabApi {
    async fn self_user(&self) -> Result<Box<dyn User>, ProviderError> {
        let user: GitlabUser = self.get_json(self.api_url("/user")?).await?;
        Ok(Box::new(user))
    }

    async fn project(&self, slug: &str) -> Result<Box<dyn Project>, ProviderError> {
        let url = self.api_url(&format!("/projects/{}", escape(slug)))?;
        let project: GitlabProject = self.get_json(url).await?;
        Ok(Box::new(project))
    }

    async fn branch_exists(&self, slug: &str, branch: &str) -> Result<bool, ProviderError> {
        let url = self.api_url(&format!(
            "/projects/{}/repository/branches/{}",
            escape(slug),
            escape(branch)
        ))?;
        Ok(self.get(url).await?.is_some())
    }

    async fn file(
        &self,
        slug: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let mut url = self.api_url(&format!(
            "/projects/{}/repository/files/{}/raw",
            escape(slug),
            escape(path)
        ))?;
        url.query_pairs_mut().append_pair("ref", git_ref);

        match self.get(url).await? {
            Some(resp) => Ok(Some(resp.bytes().await?.to_vec())),
            None => Ok(None),
        }
    }
}

// ── API models ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GitlabUser {
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl User for GitlabUser {
    fn username(&self) -> &str {
        &self.username
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn avatar_url(&self) -> &str {
        &self.avatar_url
    }

    fn is_admin(&self) -> bool {
        self.is_admin
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitlabProject {
    pub path_with_namespace: String,
    pub http_url_to_repo: String,
    #[serde(default)]
    pub default_branch: String,
}

impl Project for GitlabProject {
    fn full_name(&self) -> &str {
        &self.path_with_namespace
    }

    fn http_clone_url(&self) -> &str {
        &self.http_url_to_repo
    }

    fn default_branch(&self) -> &str {
        &self.default_branch
    }
}
