//! Workspace provisioning: descriptor parsing, resource compilation and the
//! create / list / delete lifecycle against the cluster.

pub mod cluster;
pub mod descriptor;
pub mod manager;
pub mod names;
pub mod spec;

use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to parse poddy project config: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    #[error("only one workspace type may be configured")]
    MultipleWorkspaceTypes,

    #[error("unsupported project type: {0}")]
    UnsupportedProjectType(&'static str),

    #[error("failed to parse repository clone url '{url}': {source}")]
    CloneUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("no branch found for name {0}")]
    BranchNotFound(String),

    #[error("failed to find workspace {0}")]
    NotFound(String),

    #[error("{context}: {source}")]
    Provider {
        context: String,
        source: ProviderError,
    },

    #[error("{stage}: {source}")]
    Cluster {
        stage: &'static str,
        source: anyhow::Error,
    },

    /// A later resource failed after the deployment already exists. The
    /// created resources are left in place.
    #[error("workspace {name} partially provisioned: {stage}: {source}")]
    PartiallyProvisioned {
        name: String,
        stage: &'static str,
        source: anyhow::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn provider(context: impl Into<String>) -> impl FnOnce(ProviderError) -> Self {
        let context = context.into();
        move |source| WorkspaceError::Provider { context, source }
    }

    pub(crate) fn cluster(stage: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| WorkspaceError::Cluster { stage, source }
    }

    /// Problems with the repository's project descriptor.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WorkspaceError::Descriptor(_)
                | WorkspaceError::MultipleWorkspaceTypes
                | WorkspaceError::UnsupportedProjectType(_)
                | WorkspaceError::CloneUrl { .. }
        )
    }
}
