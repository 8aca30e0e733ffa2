//! Cluster orchestration seam.
//!
//! The lifecycle manager talks to the cluster through [`ClusterClient`];
//! [`KubeCluster`] is the `kube`-backed implementation scoped to one namespace.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create the deployment and return it as stored (with its `uid`).
    async fn create_deployment(&self, deployment: Deployment) -> anyhow::Result<Deployment>;

    async fn create_service(&self, service: Service) -> anyhow::Result<Service>;

    async fn create_ingress(&self, ingress: Ingress) -> anyhow::Result<Ingress>;

    /// Deployments matching a label selector such as `a=b,c=d`.
    async fn list_deployments(&self, label_selector: &str) -> anyhow::Result<Vec<Deployment>>;

    /// Delete a deployment by name. Dependents are collected via owner references.
    async fn delete_deployment(&self, name: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// In-cluster service account config, falling back to the local kubeconfig.
    pub async fn connect(namespace: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn ingresses(&self) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create_deployment(&self, deployment: Deployment) -> anyhow::Result<Deployment> {
        Ok(self
            .deployments()
            .create(&PostParams::default(), &deployment)
            .await?)
    }

    async fn create_service(&self, service: Service) -> anyhow::Result<Service> {
        Ok(self.services().create(&PostParams::default(), &service).await?)
    }

    async fn create_ingress(&self, ingress: Ingress) -> anyhow::Result<Ingress> {
        Ok(self.ingresses().create(&PostParams::default(), &ingress).await?)
    }

    async fn list_deployments(&self, label_selector: &str) -> anyhow::Result<Vec<Deployment>> {
        let list = self
            .deployments()
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn delete_deployment(&self, name: &str) -> anyhow::Result<()> {
        self.deployments()
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }
}
