//! Workspace lifecycle: create, list and delete against the cluster.
//!
//! Cluster resources are the only state. A workspace is a deployment plus a
//! service and an ingress that are owner-referenced to it, all carrying the
//! ownership labels below.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{Ingress, IngressRule, IngressSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use serde::Serialize;

use super::cluster::ClusterClient;
use super::descriptor::ProjectDescriptor;
use super::spec::{self, WorkspaceRoute};
use super::{names, WorkspaceError};
use crate::config::DeploymentConfig;
use crate::provider::{RepositoryProvider, User};

pub const DESCRIPTOR_FILE: &str = ".poddy.yml";

pub const LABEL_MANAGED_BY: &str = "managed-by";
pub const LABEL_WORKSPACE_NAME: &str = "workspace-name";
pub const LABEL_WORKSPACE_OWNER: &str = "workspace-owner";
pub const MANAGED_BY: &str = "poddy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceSummary {
    pub name: String,
    pub url: String,
}

pub struct WorkspaceManager {
    cluster: Arc<dyn ClusterClient>,
    config: DeploymentConfig,
}

impl WorkspaceManager {
    pub fn new(cluster: Arc<dyn ClusterClient>, config: DeploymentConfig) -> Self {
        Self { cluster, config }
    }

    /// Provision a workspace for `slug` at `branch` (project default when
    /// unset or empty).
    ///
    /// Resources are submitted deployment first. If the service or ingress
    /// fails afterwards the deployment stays and
    /// [`WorkspaceError::PartiallyProvisioned`] is returned.
    pub async fn create(
        &self,
        provider: &dyn RepositoryProvider,
        slug: &str,
        branch: Option<&str>,
        user: &dyn User,
        access_token: &str,
    ) -> Result<WorkspaceSummary, WorkspaceError> {
        let project = provider
            .project(slug)
            .await
            .map_err(WorkspaceError::provider("failed to get project"))?;

        let branch = match branch.filter(|b| !b.is_empty()) {
            Some(b) => b.to_string(),
            None => project.default_branch().to_string(),
        };

        let exists = provider
            .branch_exists(slug, &branch)
            .await
            .map_err(WorkspaceError::provider("failed to look up branch"))?;
        if !exists {
            return Err(WorkspaceError::BranchNotFound(branch));
        }

        let descriptor = match provider
            .file(slug, &branch, DESCRIPTOR_FILE)
            .await
            .map_err(WorkspaceError::provider("failed to get poddy project config"))?
        {
            Some(raw) => ProjectDescriptor::from_yaml(&raw)?,
            None => ProjectDescriptor::default(),
        };

        let name = names::generate();
        let route = WorkspaceRoute {
            host: self.host_for(&name),
            name: name.clone(),
        };
        let compiled = spec::compile(&descriptor, project.as_ref(), user, access_token, &route)?;

        let labels = ownership_labels(&name, user.username());
        tracing::info!(
            workspace = %name,
            owner = %user.username(),
            project = %slug,
            branch = %branch,
            workspace_type = descriptor.workspace.name(),
            "Creating workspace"
        );

        let created = self
            .cluster
            .create_deployment(deployment(&name, &labels, compiled.deployment))
            .await
            .map_err(WorkspaceError::cluster("failed to create deployment"))?;
        let owner = owner_reference(&name, &created);

        let partial = |stage: &'static str| {
            let name = name.clone();
            move |source: anyhow::Error| {
                tracing::error!(workspace = %name, stage, error = %source, "Workspace partially provisioned");
                WorkspaceError::PartiallyProvisioned { name, stage, source }
            }
        };

        self.cluster
            .create_service(service(&name, &labels, compiled.service_ports, owner.clone()))
            .await
            .map_err(partial("failed to create service"))?;

        self.cluster
            .create_ingress(ingress(
                &name,
                &labels,
                compiled.ingress_rules,
                owner,
                self.config.ingress_class_name(),
            ))
            .await
            .map_err(partial("failed to create ingress"))?;

        Ok(WorkspaceSummary {
            url: route.host,
            name,
        })
    }

    /// Workspaces owned by `user`.
    pub async fn list(&self, user: &dyn User) -> Result<Vec<WorkspaceSummary>, WorkspaceError> {
        let deployments = self
            .cluster
            .list_deployments(&owner_selector(user.username()))
            .await
            .map_err(WorkspaceError::cluster("failed to list workspaces"))?;

        Ok(deployments
            .iter()
            .filter_map(|d| {
                let labels = d.metadata.labels.as_ref()?;
                if labels.get(LABEL_WORKSPACE_OWNER).map(String::as_str) != Some(user.username()) {
                    return None;
                }
                let name = labels.get(LABEL_WORKSPACE_NAME)?.clone();
                Some(WorkspaceSummary {
                    url: self.host_for(&name),
                    name,
                })
            })
            .collect())
    }

    /// Delete the workspace deployment `name`.
    ///
    /// The caller must own at least one workspace; `name` itself is not
    /// matched against the caller. Service and ingress go with the
    /// deployment through owner references.
    pub async fn delete(&self, name: &str, user: &dyn User) -> Result<(), WorkspaceError> {
        let owned = self
            .cluster
            .list_deployments(&owner_selector(user.username()))
            .await
            .map_err(WorkspaceError::cluster("failed to list workspaces"))?;
        if owned.is_empty() {
            return Err(WorkspaceError::NotFound(name.to_string()));
        }
        if !owns(&owned, name) {
            tracing::warn!(
                workspace = %name,
                owner = %user.username(),
                "Deleting a workspace not owned by the caller"
            );
        }

        tracing::info!(workspace = %name, owner = %user.username(), "Deleting workspace");
        self.cluster
            .delete_deployment(name)
            .await
            .map_err(WorkspaceError::cluster("failed to delete workspace"))
    }

    fn host_for(&self, name: &str) -> String {
        format!("{}.{}", name, self.config.base_domain)
    }
}

/// Whether `name` is among the `owned` deployments.
fn owns(owned: &[Deployment], name: &str) -> bool {
    owned.iter().any(|d| {
        d.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(LABEL_WORKSPACE_NAME))
            .map(String::as_str)
            == Some(name)
    })
}

// ── Resource assembly ────────────────────────────────────────

pub fn ownership_labels(name: &str, owner: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_WORKSPACE_NAME.to_string(), name.to_string()),
        (LABEL_WORKSPACE_OWNER.to_string(), owner.to_string()),
    ])
}

pub fn owner_selector(owner: &str) -> String {
    format!(
        "{}={},{}={}",
        LABEL_MANAGED_BY, MANAGED_BY, LABEL_WORKSPACE_OWNER, owner
    )
}

fn metadata(name: &str, labels: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels.clone()),
        ..Default::default()
    }
}

fn deployment(name: &str, labels: &BTreeMap<String, String>, mut spec: DeploymentSpec) -> Deployment {
    let template_meta = spec.template.metadata.get_or_insert_with(Default::default);
    template_meta
        .labels
        .get_or_insert_with(Default::default)
        .extend(labels.clone());

    spec.replicas = Some(1);
    spec.selector = LabelSelector {
        match_labels: Some(labels.clone()),
        ..Default::default()
    };

    Deployment {
        metadata: metadata(name, labels),
        spec: Some(spec),
        ..Default::default()
    }
}

fn owner_reference(name: &str, deployment: &Deployment) -> OwnerReference {
    OwnerReference {
        api_version: "apps/v1".into(),
        kind: "Deployment".into(),
        name: deployment.metadata.name.clone().unwrap_or_else(|| name.to_string()),
        uid: deployment.metadata.uid.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn service(
    name: &str,
    labels: &BTreeMap<String, String>,
    ports: Vec<ServicePort>,
    owner: OwnerReference,
) -> Service {
    let mut meta = metadata(name, labels);
    meta.owner_references = Some(vec![owner]);
    Service {
        metadata: meta,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".into()),
            selector: Some(labels.clone()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ingress(
    name: &str,
    labels: &BTreeMap<String, String>,
    rules: Vec<IngressRule>,
    owner: OwnerReference,
    ingress_class: Option<String>,
) -> Ingress {
    let mut meta = metadata(name, labels);
    meta.owner_references = Some(vec![owner]);
    Ingress {
        metadata: meta,
        spec: Some(IngressSpec {
            ingress_class_name: ingress_class,
            rules: Some(rules),
            ..Default::default()
        }),
        ..Default::default()
    }
}
