//! Compiles a [`ProjectDescriptor`] into Kubernetes resource specs.
//!
//! Output ordering is stable: the primary `server` entry always comes first in
//! both the service port table and the ingress rules, followed by one entry per
//! auxiliary service in descriptor order.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec,
    ServicePort, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule, IngressServiceBackend,
    ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use url::Url;

use super::descriptor::{CodeServerConfig, ProjectDescriptor, ServiceConfig, WorkspaceType};
use super::WorkspaceError;
use crate::provider::{Project, User};

pub const SERVER_PORT: u16 = 8080;
pub const SERVER_PORT_NAME: &str = "server";
pub const DEFAULT_CODE_SERVER_IMAGE: &str = "codercom/code-server:4.0.2";
pub const SETUP_IMAGE: &str = "alpine/git:user";

const WORKSPACE_VOLUME: &str = "workspace-data";
const CONFIG_VOLUME: &str = "config-data";

/// Where a workspace is reachable: its generated name and primary hostname.
#[derive(Debug, Clone)]
pub struct WorkspaceRoute {
    pub name: String,
    pub host: String,
}

/// Everything the lifecycle manager submits for one workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceResourceSpec {
    pub deployment: DeploymentSpec,
    pub service_ports: Vec<ServicePort>,
    pub ingress_rules: Vec<IngressRule>,
}

pub fn compile(
    descriptor: &ProjectDescriptor,
    project: &dyn Project,
    user: &dyn User,
    access_token: &str,
    route: &WorkspaceRoute,
) -> Result<WorkspaceResourceSpec, WorkspaceError> {
    let deployment = match &descriptor.workspace {
        WorkspaceType::CodeServer(cfg) => code_server_deployment(cfg, project, user, access_token)?,
        other => return Err(WorkspaceError::UnsupportedProjectType(other.name())),
    };

    Ok(WorkspaceResourceSpec {
        deployment,
        service_ports: service_ports(&descriptor.services),
        ingress_rules: ingress_rules(&descriptor.services, route),
    })
}

// ── code-server ──────────────────────────────────────────────

fn code_server_deployment(
    cfg: &CodeServerConfig,
    project: &dyn Project,
    user: &dyn User,
    access_token: &str,
) -> Result<DeploymentSpec, WorkspaceError> {
    let clone_url = project.http_clone_url();
    let git_host = Url::parse(clone_url)
        .map_err(|source| WorkspaceError::CloneUrl {
            url: clone_url.to_string(),
            source,
        })?
        .host_str()
        .unwrap_or_default()
        .to_string();

    let env = vec![
        env_var("REPO_URL", clone_url),
        env_var("GIT_HOST", &git_host),
        env_var("USERNAME", user.username()),
        env_var("EMAIL", user.email()),
        env_var("ACCESS_TOKEN", access_token),
    ];

    let image = cfg
        .image
        .as_deref()
        .filter(|i| !i.is_empty())
        .unwrap_or(DEFAULT_CODE_SERVER_IMAGE);

    let setup = Container {
        name: "workspace-setup".into(),
        image: Some(SETUP_IMAGE.into()),
        env: Some(env.clone()),
        command: Some(shell()),
        args: Some(vec![setup_script()]),
        volume_mounts: Some(vec![
            mount(WORKSPACE_VOLUME, "/workspace", None),
            mount(CONFIG_VOLUME, "/config", None),
        ]),
        ..Default::default()
    };

    let server = Container {
        name: "code-server".into(),
        image: Some(image.into()),
        env: Some(env),
        command: Some(shell()),
        args: Some(vec![start_script(&cfg.extensions)]),
        ports: Some(vec![ContainerPort {
            name: Some(SERVER_PORT_NAME.into()),
            container_port: SERVER_PORT.into(),
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            mount(WORKSPACE_VOLUME, "/workspace", None),
            mount(CONFIG_VOLUME, "/home/coder/.netrc", Some(".netrc")),
            mount(CONFIG_VOLUME, "/home/coder/.gitconfig", Some(".gitconfig")),
        ]),
        ..Default::default()
    };

    Ok(DeploymentSpec {
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(BTreeMap::from([(
                    "workspace-type".to_string(),
                    "code-server".to_string(),
                )])),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                volumes: Some(vec![empty_dir(WORKSPACE_VOLUME), empty_dir(CONFIG_VOLUME)]),
                init_containers: Some(vec![setup]),
                containers: vec![server],
                ..Default::default()
            }),
        },
        ..Default::default()
    })
}

/// Writes Git credentials and identity into the config volume and clones the
/// repository into the workspace volume.
fn setup_script() -> String {
    [
        "set -v",
        r#"echo -e "machine $GIT_HOST\nlogin oauth2\npassword $ACCESS_TOKEN" > ~/.netrc"#,
        "chmod 600 ~/.netrc",
        "git clone $REPO_URL /workspace",
        "cp ~/.netrc /config/.netrc",
        r#"echo -e "[user]\\n        name = $USERNAME\\n        email = $EMAIL" > /config/.gitconfig"#,
    ]
    .iter()
    .map(|line| format!("{}\n", line))
    .collect()
}

/// Installs the requested extensions, then runs code-server on [`SERVER_PORT`].
fn start_script(extensions: &[String]) -> String {
    let mut script = String::from("set -v\n");
    for extension in extensions {
        script.push_str(&format!(
            "/usr/bin/entrypoint.sh --install-extension {}\n",
            extension
        ));
    }
    script.push_str(&format!(
        "/usr/bin/entrypoint.sh --bind-addr 0.0.0.0:{} --auth none /workspace\n",
        SERVER_PORT
    ));
    script
}

fn shell() -> Vec<String> {
    vec!["/bin/sh".into(), "-c".into()]
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn mount(volume: &str, path: &str, sub_path: Option<&str>) -> VolumeMount {
    VolumeMount {
        name: volume.into(),
        mount_path: path.into(),
        sub_path: sub_path.map(String::from),
        ..Default::default()
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.into(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

// ── Networking ───────────────────────────────────────────────

pub fn service_ports(services: &[ServiceConfig]) -> Vec<ServicePort> {
    let mut ports = Vec::with_capacity(services.len() + 1);
    ports.push(ServicePort {
        name: Some(SERVER_PORT_NAME.into()),
        protocol: Some("TCP".into()),
        port: SERVER_PORT.into(),
        target_port: Some(IntOrString::String(SERVER_PORT_NAME.into())),
        ..Default::default()
    });
    ports.extend(services.iter().map(|svc| ServicePort {
        name: Some(svc.name.clone()),
        protocol: Some("TCP".into()),
        port: svc.port.into(),
        target_port: Some(IntOrString::Int(svc.port.into())),
        ..Default::default()
    }));
    ports
}

pub fn ingress_rules(services: &[ServiceConfig], route: &WorkspaceRoute) -> Vec<IngressRule> {
    let mut rules = Vec::with_capacity(services.len() + 1);
    rules.push(ingress_rule(route.host.clone(), &route.name, SERVER_PORT_NAME));
    rules.extend(services.iter().map(|svc| {
        ingress_rule(format!("{}-{}", svc.name, route.host), &route.name, &svc.name)
    }));
    rules
}

fn ingress_rule(host: String, service_name: &str, port_name: &str) -> IngressRule {
    IngressRule {
        host: Some(host),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".into()),
                path_type: "Prefix".into(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: service_name.into(),
                        port: Some(ServiceBackendPort {
                            name: Some(port_name.into()),
                            number: None,
                        }),
                    }),
                    resource: None,
                },
            }],
        }),
    }
}
