use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

const CONFIG_FILE_NAME: &str = "poddy.yml";
const CONFIG_SEARCH_PATHS: [&str; 3] = ["config", "data", "/etc/poddy"];
const ENV_PREFIX: &str = "PODDY_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl std::fmt::Display) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub deployment: DeploymentConfig,
    pub providers: Vec<ProviderEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Go-style listen address; `":8080"` binds every interface.
    pub listen_address: String,
    /// Public URL of this server, used for OAuth2 redirect URLs and the cookie domain.
    pub url: String,
    /// Hex-encoded key used to sign session cookies.
    pub cookie_secret: String,
    pub secure_cookies: bool,
    /// Directory holding the built frontend (`index.html`, `assets/`).
    pub frontend_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: ":8080".into(),
            url: "http://poddy.127.0.0.1.nip.io:8080".into(),
            cookie_secret: "abcdef".into(),
            secure_cookies: false,
            frontend_dir: PathBuf::from("./frontend/dist"),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        };
        raw.parse()
            .map_err(|e| ConfigError::invalid("server.listenAddress", e))
    }

    pub fn parsed_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.url).map_err(|e| ConfigError::invalid("server.url", e))
    }

    pub fn cookie_key(&self) -> Result<Vec<u8>, ConfigError> {
        hex::decode(&self.cookie_secret)
            .map_err(|e| ConfigError::invalid("server.cookieSecret", e))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub namespace: String,
    pub base_domain: String,
    /// Empty means the cluster's default ingress class.
    pub ingress_class: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            namespace: "poddy-workspaces".into(),
            base_domain: "poddy.127.0.0.1.nip.io".into(),
            ingress_class: String::new(),
        }
    }
}

impl DeploymentConfig {
    pub fn ingress_class_name(&self) -> Option<String> {
        if self.ingress_class.is_empty() {
            None
        } else {
            Some(self.ingress_class.clone())
        }
    }
}

/// One `providers[]` entry as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Load configuration.
///
/// With an explicit path the file must exist. Otherwise `poddy.yml` is looked
/// up in the default search paths and a missing file falls back to defaults.
/// `PODDY_*` environment variables (and `.env`) override file values.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => CONFIG_SEARCH_PATHS
            .iter()
            .map(|dir| Path::new(dir).join(CONFIG_FILE_NAME))
            .find(|p| p.is_file()),
    };

    let mut cfg = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            tracing::info!(path = %path.display(), "Loaded configuration file");
            from_yaml(&raw).map_err(|source| ConfigError::Parse { path, source })?
        }
        None => {
            tracing::info!("No configuration file found, using defaults");
            Config::default()
        }
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;

    // Fail fast on values that are otherwise only checked when first used.
    cfg.server.parsed_url()?;
    cfg.server.cookie_key()?;
    cfg.server.listen_addr()?;

    Ok(cfg)
}

pub fn from_yaml(raw: &str) -> Result<Config, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(raw)
}

fn apply_env_overrides(
    cfg: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(v) = lookup("SERVER_LISTENADDRESS") {
        cfg.server.listen_address = v;
    }
    if let Some(v) = lookup("SERVER_URL") {
        cfg.server.url = v;
    }
    if let Some(v) = lookup("SERVER_COOKIESECRET") {
        cfg.server.cookie_secret = v;
    }
    if let Some(v) = lookup("SERVER_SECURECOOKIES") {
        cfg.server.secure_cookies = v
            .parse()
            .map_err(|e| ConfigError::invalid("server.secureCookies", e))?;
    }
    if let Some(v) = lookup("SERVER_FRONTENDDIR") {
        cfg.server.frontend_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("DEPLOYMENT_NAMESPACE") {
        cfg.deployment.namespace = v;
    }
    if let Some(v) = lookup("DEPLOYMENT_BASEDOMAIN") {
        cfg.deployment.base_domain = v;
    }
    if let Some(v) = lookup("DEPLOYMENT_INGRESSCLASS") {
        cfg.deployment.ingress_class = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
server:
  listenAddress: "127.0.0.1:9000"
  url: "https://poddy.example.com"
  cookieSecret: "00ff00ff"
  secureCookies: true
deployment:
  namespace: "workspaces"
  baseDomain: "ws.example.com"
  ingressClass: "nginx"
providers:
  - id: gitlab
    type: gitlab
    client_id: abc
    client_secret: def
    base_url: https://gitlab.example.com
    auth_endpoint: /oauth/authorize
    token_endpoint: /oauth/token
    scopes: [api, read_user]
"#;

    #[test]
    fn test_parse_full_config() {
        let cfg = from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.server.url, "https://poddy.example.com");
        assert!(cfg.server.secure_cookies);
        assert_eq!(cfg.deployment.namespace, "workspaces");
        assert_eq!(cfg.deployment.ingress_class_name().as_deref(), Some("nginx"));
        assert_eq!(cfg.providers.len(), 1);
        assert_eq!(cfg.providers[0].kind, "gitlab");
        assert_eq!(cfg.providers[0].scopes, vec!["api", "read_user"]);
        assert_eq!(cfg.server.cookie_key().unwrap(), vec![0x00, 0xff, 0x00, 0xff]);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let cfg = from_yaml("deployment:\n  namespace: other\n").unwrap();
        assert_eq!(cfg.deployment.namespace, "other");
        assert_eq!(cfg.deployment.base_domain, "poddy.127.0.0.1.nip.io");
        assert_eq!(cfg.server.listen_address, ":8080");
        assert!(cfg.deployment.ingress_class_name().is_none());
        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn test_empty_file_is_default() {
        let cfg = from_yaml("").unwrap();
        assert_eq!(cfg.server.url, "http://poddy.127.0.0.1.nip.io:8080");
    }

    #[test]
    fn test_go_style_listen_address() {
        let server = ServerConfig::default();
        assert_eq!(server.listen_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SERVER_URL", "https://override.example.com"),
            ("SERVER_SECURECOOKIES", "true"),
            ("DEPLOYMENT_BASEDOMAIN", "apps.example.com"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.server.url, "https://override.example.com");
        assert!(cfg.server.secure_cookies);
        assert_eq!(cfg.deployment.base_domain, "apps.example.com");
        assert_eq!(cfg.deployment.namespace, "poddy-workspaces");
    }

    #[test]
    fn test_invalid_bool_override_is_rejected() {
        let mut cfg = Config::default();
        let err = apply_env_overrides(&mut cfg, |k| {
            (k == "SERVER_SECURECOOKIES").then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("server.secureCookies"));
    }

    #[test]
    fn test_non_hex_cookie_secret_is_rejected() {
        let server = ServerConfig {
            cookie_secret: "not-hex".into(),
            ..ServerConfig::default()
        };
        assert!(server.cookie_key().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poddy.yml");
        std::fs::write(&path, SAMPLE).unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.providers[0].id, "gitlab");
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("nope.yml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
