//! The per-repository `.poddy.yml` project descriptor.
//!
//! ```yaml
//! codeServer:
//!   image: codercom/code-server:4.0.2
//!   extensions: [rust-lang.rust-analyzer]
//! services:
//!   - name: api
//!     port: 9000
//! ```
//!
//! At most one of `codeServer`, `jbProjector`, `jbFleet` may be present; with
//! none of them the code-server defaults apply.

use serde::Deserialize;

use super::WorkspaceError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodeServerConfig {
    /// Container image; the built-in default when unset or empty.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceType {
    CodeServer(CodeServerConfig),
    JbProjector,
    JbFleet,
}

impl WorkspaceType {
    pub fn name(&self) -> &'static str {
        match self {
            WorkspaceType::CodeServer(_) => "code-server",
            WorkspaceType::JbProjector => "jb-projector",
            WorkspaceType::JbFleet => "jb-fleet",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDescriptor {
    pub workspace: WorkspaceType,
    pub services: Vec<ServiceConfig>,
}

impl Default for ProjectDescriptor {
    fn default() -> Self {
        Self {
            workspace: WorkspaceType::CodeServer(CodeServerConfig::default()),
            services: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Placeholder {}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    code_server: Option<CodeServerConfig>,
    jb_projector: Option<Placeholder>,
    jb_fleet: Option<Placeholder>,
    #[serde(default)]
    services: Vec<ServiceConfig>,
}

impl ProjectDescriptor {
    pub fn from_yaml(raw: &[u8]) -> Result<Self, WorkspaceError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let raw: Option<RawDescriptor> = serde_yaml::from_slice(raw)?;
        let raw = raw.unwrap_or_default();

        let mut types = Vec::with_capacity(1);
        if let Some(cfg) = raw.code_server {
            types.push(WorkspaceType::CodeServer(cfg));
        }
        if raw.jb_projector.is_some() {
            types.push(WorkspaceType::JbProjector);
        }
        if raw.jb_fleet.is_some() {
            types.push(WorkspaceType::JbFleet);
        }

        let workspace = match types.len() {
            0 => WorkspaceType::CodeServer(CodeServerConfig::default()),
            1 => types.remove(0),
            _ => return Err(WorkspaceError::MultipleWorkspaceTypes),
        };

        Ok(Self {
            workspace,
            services: raw.services,
        })
    }
}
