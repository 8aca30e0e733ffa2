//! In-memory stand-ins for the cluster and the source-control provider.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;

use poddy::provider::{Project, ProviderError, RepositoryProvider, User};
use poddy::workspace::cluster::ClusterClient;

// ── Cluster ──────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCluster {
    pub deployments: Mutex<Vec<Deployment>>,
    pub services: Mutex<Vec<Service>>,
    pub ingresses: Mutex<Vec<Ingress>>,
    pub fail_service: AtomicBool,
    pub fail_ingress: AtomicBool,
}

impl FakeCluster {
    pub fn deployment_names(&self) -> Vec<String> {
        self.deployments
            .lock()
            .unwrap()
            .iter()
            .filter_map(|d| d.metadata.name.clone())
            .collect()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.metadata.name.as_deref() == Some(name))
            .cloned()
    }

    pub fn ingress(&self, name: &str) -> Option<Ingress> {
        self.ingresses
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.metadata.name.as_deref() == Some(name))
            .cloned()
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.deployments
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.metadata.name.as_deref() == Some(name))
            .cloned()
    }
}

fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    let Some(labels) = labels else {
        return selector.is_empty();
    };
    selector
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .all(|(k, v)| labels.get(k).map(String::as_str) == Some(v))
}

fn owned_by(refs: Option<&Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>>, name: &str) -> bool {
    refs.map(|refs| refs.iter().any(|r| r.kind == "Deployment" && r.name == name))
        .unwrap_or(false)
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_deployment(&self, mut deployment: Deployment) -> anyhow::Result<Deployment> {
        let mut deployments = self.deployments.lock().unwrap();
        if deployments.iter().any(|d| d.metadata.name == deployment.metadata.name) {
            anyhow::bail!("deployments.apps {:?} already exists", deployment.metadata.name);
        }
        deployment.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        deployments.push(deployment.clone());
        Ok(deployment)
    }

    async fn create_service(&self, service: Service) -> anyhow::Result<Service> {
        if self.fail_service.load(Ordering::SeqCst) {
            anyhow::bail!("services is forbidden");
        }
        self.services.lock().unwrap().push(service.clone());
        Ok(service)
    }

    async fn create_ingress(&self, ingress: Ingress) -> anyhow::Result<Ingress> {
        if self.fail_ingress.load(Ordering::SeqCst) {
            anyhow::bail!("admission webhook denied the request");
        }
        self.ingresses.lock().unwrap().push(ingress.clone());
        Ok(ingress)
    }

    async fn list_deployments(&self, label_selector: &str) -> anyhow::Result<Vec<Deployment>> {
        Ok(self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .filter(|d| matches_selector(d.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn delete_deployment(&self, name: &str) -> anyhow::Result<()> {
        let mut deployments = self.deployments.lock().unwrap();
        let before = deployments.len();
        deployments.retain(|d| d.metadata.name.as_deref() != Some(name));
        if deployments.len() == before {
            anyhow::bail!("deployments.apps \"{}\" not found", name);
        }
        // Owner-reference garbage collection.
        self.services
            .lock()
            .unwrap()
            .retain(|s| !owned_by(s.metadata.owner_references.as_ref(), name));
        self.ingresses
            .lock()
            .unwrap()
            .retain(|i| !owned_by(i.metadata.owner_references.as_ref(), name));
        Ok(())
    }
}

// ── Repository provider ──────────────────────────────────────

#[derive(Clone)]
pub struct FakeUser {
    pub username: String,
}

impl FakeUser {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
        }
    }
}

impl User for FakeUser {
    fn username(&self) -> &str {
        &self.username
    }
    fn display_name(&self) -> &str {
        &self.username
    }
    fn email(&self) -> &str {
        "dev@example.com"
    }
    fn avatar_url(&self) -> &str {
        ""
    }
    fn is_admin(&self) -> bool {
        false
    }
}

#[derive(Clone)]
pub struct FakeProject {
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: String,
}

impl Project for FakeProject {
    fn full_name(&self) -> &str {
        &self.full_name
    }
    fn http_clone_url(&self) -> &str {
        &self.clone_url
    }
    fn default_branch(&self) -> &str {
        &self.default_branch
    }
}

/// A single repository with a set of branches and files per ref.
pub struct FakeRepo {
    pub user: FakeUser,
    pub project: FakeProject,
    pub branches: HashSet<String>,
    pub files: HashMap<(String, String), Vec<u8>>,
    pub file_requests: Mutex<Vec<String>>,
}

impl FakeRepo {
    pub fn new(username: &str) -> Self {
        Self {
            user: FakeUser::new(username),
            project: FakeProject {
                full_name: "group/repo".into(),
                clone_url: "https://gitlab.example.com/group/repo.git".into(),
                default_branch: "main".into(),
            },
            branches: HashSet::from(["main".to_string()]),
            files: HashMap::new(),
            file_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branches.insert(branch.to_string());
        self
    }

    pub fn with_descriptor(mut self, git_ref: &str, raw: &str) -> Self {
        self.files.insert(
            (git_ref.to_string(), ".poddy.yml".to_string()),
            raw.as_bytes().to_vec(),
        );
        self
    }
}

fn not_found(what: &str) -> ProviderError {
    ProviderError::Status {
        status: reqwest::StatusCode::NOT_FOUND,
        url: what.to_string(),
    }
}

#[async_trait]
impl RepositoryProvider for FakeRepo {
    async fn self_user(&self) -> Result<Box<dyn User>, ProviderError> {
        Ok(Box::new(self.user.clone()))
    }

    async fn project(&self, slug: &str) -> Result<Box<dyn Project>, ProviderError> {
        if slug != self.project.full_name {
            return Err(not_found(slug));
        }
        Ok(Box::new(self.project.clone()))
    }

    async fn branch_exists(&self, _slug: &str, branch: &str) -> Result<bool, ProviderError> {
        Ok(self.branches.contains(branch))
    }

    async fn file(
        &self,
        _slug: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        self.file_requests.lock().unwrap().push(git_ref.to_string());
        Ok(self
            .files
            .get(&(git_ref.to_string(), path.to_string()))
            .cloned())
    }
}

/// `adverb-adjective-noun`, lowercase letters only.
pub fn is_generated_name(name: &str) -> bool {
    let parts: Vec<_> = name.split('-').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
}
