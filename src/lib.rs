//! Poddy: per-user development workspaces on Kubernetes, provisioned from a
//! source-control repository the user has authorized via OAuth2.

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod oauth;
pub mod provider;
pub mod session;
pub mod workspace;

use std::sync::Arc;

use anyhow::Context;

use config::Config;
use oauth::registry::ProviderRegistry;
use session::SessionStore;
use workspace::cluster::ClusterClient;
use workspace::manager::WorkspaceManager;

/// Shared application state passed to handlers.
pub struct AppState {
    pub config: Config,
    pub providers: ProviderRegistry,
    pub sessions: SessionStore,
    pub workspaces: WorkspaceManager,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, cluster: Arc<dyn ClusterClient>) -> anyhow::Result<Self> {
        let providers =
            ProviderRegistry::from_config(&config).context("failed to build provider registry")?;
        let sessions =
            SessionStore::from_config(&config.server).context("invalid session configuration")?;
        let workspaces = WorkspaceManager::new(cluster, config.deployment.clone());
        let http = reqwest::Client::builder()
            .user_agent(concat!("poddy/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            config,
            providers,
            sessions,
            workspaces,
            http,
        })
    }
}
