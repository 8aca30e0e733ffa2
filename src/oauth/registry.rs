//! Configured source-control providers.
//!
//! Built once at startup. Every entry's OAuth2 endpoints are resolved against
//! its base URL and the redirect URL is derived from the server URL, so a bad
//! URL stops the process before it starts serving.

use std::sync::Arc;

use thiserror::Error;
use url::Url;

use super::{OAuthClientConfig, TokenSource};
use crate::config::Config;
use crate::provider::gitlab::GitlabApi;
use crate::provider::RepositoryProvider;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid server url '{url}': {source}")]
    ServerUrl { url: String, source: url::ParseError },

    #[error("provider '{id}': invalid {field} '{value}': {source}")]
    Url {
        id: String,
        field: &'static str,
        value: String,
        source: url::ParseError,
    },

    #[error("provider '{id}': base url '{url}' has no host")]
    MissingHost { id: String, url: String },

    #[error("provider '{id}': invalid provider type: {kind}")]
    UnknownKind { id: String, kind: String },

    #[error("duplicate provider id: {0}")]
    DuplicateId(String),
}

/// Which REST dialect a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gitlab,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "gitlab" => Some(ProviderKind::Gitlab),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gitlab => "gitlab",
        }
    }
}

/// A configured provider with its derived OAuth2 settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: Url,
    /// Host (with port, if any) of the base URL; used to match workspace requests.
    pub host: String,
    pub oauth: Arc<OAuthClientConfig>,
}

impl ProviderConfig {
    /// REST client for this provider authenticated through `source`.
    pub fn repository_provider(
        &self,
        http: &reqwest::Client,
        source: Arc<TokenSource>,
    ) -> Box<dyn RepositoryProvider> {
        match self.kind {
            ProviderKind::Gitlab => {
                Box::new(GitlabApi::new(self.base_url.clone(), http.clone(), source))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn from_config(cfg: &Config) -> Result<Self, RegistryError> {
        let server_url = Url::parse(&cfg.server.url).map_err(|source| RegistryError::ServerUrl {
            url: cfg.server.url.clone(),
            source,
        })?;

        let mut providers: Vec<ProviderConfig> = Vec::with_capacity(cfg.providers.len());
        for entry in &cfg.providers {
            if providers.iter().any(|p| p.id == entry.id) {
                return Err(RegistryError::DuplicateId(entry.id.clone()));
            }

            let kind = ProviderKind::parse(&entry.kind).ok_or_else(|| RegistryError::UnknownKind {
                id: entry.id.clone(),
                kind: entry.kind.clone(),
            })?;

            let url_err = |field: &'static str, value: &str| {
                let id = entry.id.clone();
                let value = value.to_string();
                move |source: url::ParseError| RegistryError::Url {
                    id,
                    field,
                    value,
                    source,
                }
            };

            let base_url = Url::parse(&entry.base_url).map_err(url_err("base_url", &entry.base_url))?;
            let host = host_with_port(&base_url).ok_or_else(|| RegistryError::MissingHost {
                id: entry.id.clone(),
                url: entry.base_url.clone(),
            })?;

            let auth_url = base_url
                .join(&entry.auth_endpoint)
                .map_err(url_err("auth_endpoint", &entry.auth_endpoint))?;
            let token_url = base_url
                .join(&entry.token_endpoint)
                .map_err(url_err("token_endpoint", &entry.token_endpoint))?;
            let redirect_path = format!("/oauth/redirect/{}", entry.id);
            let redirect_url = server_url
                .join(&redirect_path)
                .map_err(url_err("redirect url", &redirect_path))?;

            tracing::debug!(provider = %entry.id, host = %host, "Registered provider");

            providers.push(ProviderConfig {
                id: entry.id.clone(),
                kind,
                base_url,
                host,
                oauth: Arc::new(OAuthClientConfig {
                    client_id: entry.client_id.clone(),
                    client_secret: entry.client_secret.clone(),
                    auth_url,
                    token_url,
                    redirect_url,
                    scopes: entry.scopes.clone(),
                }),
            });
        }

        Ok(Self { providers })
    }

    pub fn by_id(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn by_host(&self, host: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.host == host)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderEntry;

    fn entry(id: &str, base_url: &str) -> ProviderEntry {
        ProviderEntry {
            id: id.into(),
            kind: "gitlab".into(),
            client_id: format!("{}-client", id),
            client_secret: "secret".into(),
            base_url: base_url.into(),
            auth_endpoint: "/oauth/authorize".into(),
            token_endpoint: "/oauth/token".into(),
            scopes: vec!["api".into()],
        }
    }

    fn config_with(entries: Vec<ProviderEntry>) -> Config {
        let mut cfg = Config::default();
        cfg.server.url = "https://poddy.example.com".into();
        cfg.providers = entries;
        cfg
    }

    #[test]
    fn test_endpoints_resolved_against_base_url() {
        let registry =
            ProviderRegistry::from_config(&config_with(vec![entry("gl", "https://gitlab.example.com/")]))
                .unwrap();
        let provider = registry.by_id("gl").unwrap();

        assert_eq!(provider.oauth.auth_url.as_str(), "https://gitlab.example.com/oauth/authorize");
        assert_eq!(provider.oauth.token_url.as_str(), "https://gitlab.example.com/oauth/token");
        assert_eq!(
            provider.oauth.redirect_url.as_str(),
            "https://poddy.example.com/oauth/redirect/gl"
        );
        assert_eq!(provider.host, "gitlab.example.com");
        assert_eq!(provider.oauth.client_id, "gl-client");
    }

    #[test]
    fn test_host_keeps_explicit_port() {
        let registry =
            ProviderRegistry::from_config(&config_with(vec![entry("local", "http://git.local:8929")]))
                .unwrap();
        assert!(registry.by_host("git.local:8929").is_some());
        assert!(registry.by_host("git.local").is_none());
    }

    #[test]
    fn test_lookup_by_id_and_host_agree() {
        let registry = ProviderRegistry::from_config(&config_with(vec![
            entry("a", "https://a.example.com"),
            entry("b", "https://b.example.com"),
        ]))
        .unwrap();

        for provider in registry.iter() {
            let by_host = registry.by_host(&provider.host).unwrap();
            let by_id = registry.by_id(&provider.id).unwrap();
            assert_eq!(by_host.id, by_id.id);
            assert_eq!(by_host.host, by_id.host);
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_lookups_are_absent() {
        let registry = ProviderRegistry::from_config(&config_with(vec![])).unwrap();
        assert!(registry.is_empty());
        assert!(registry.by_id("nope").is_none());
        assert!(registry.by_host("nope.example.com").is_none());
    }

    #[test]
    fn test_bad_base_url_is_fatal() {
        let err = ProviderRegistry::from_config(&config_with(vec![entry("bad", "not a url")]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Url { field: "base_url", .. }));
    }

    #[test]
    fn test_unknown_provider_type_is_fatal() {
        let mut e = entry("gh", "https://github.com");
        e.kind = "github".into();
        let err = ProviderRegistry::from_config(&config_with(vec![e])).unwrap_err();
        assert!(err.to_string().contains("invalid provider type: github"));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = ProviderRegistry::from_config(&config_with(vec![
            entry("gl", "https://a.example.com"),
            entry("gl", "https://b.example.com"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(id) if id == "gl"));
    }
}
