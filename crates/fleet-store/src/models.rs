//! Resource model: namespaces, control planes, controllers and agents
//!
//! Every polymorphic resource is a closed enum wrapping one struct per
//! backend, so matches over variants are checked at compile time.

use crate::agent_config::AgentConfiguration;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Port a controller API listens on when none is given
pub const DEFAULT_CONTROLLER_PORT: u16 = 51121;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Capabilities shared by every deployable resource
pub trait Resource {
    /// Resource name, unique within its namespace and kind
    fn name(&self) -> &str;

    /// Externally reachable endpoint once deployed
    fn endpoint(&self) -> Option<&str>;

    /// Normalize user input (trim names, fill defaults)
    fn sanitize(&mut self);

    /// Check the resource is complete and self-consistent
    fn validate(&self) -> Result<()>;
}

/// Backend a resource is deployed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Kubernetes cluster
    Kubernetes,
    /// Remote host managed over SSH
    Remote,
    /// Container on the local machine
    Local,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Backend::Kubernetes => "kubernetes",
            Backend::Remote => "remote",
            Backend::Local => "local",
        };
        f.write_str(s)
    }
}

/// Normalize a controller address into a full endpoint URL.
///
/// A bare host gets the `http` scheme and the default controller port.
pub fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme.to_string(), rest),
        None => ("http".to_string(), trimmed),
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let has_port = match authority.rfind(']') {
        // IPv6 literal: a port can only follow the closing bracket
        Some(idx) => authority[idx..].contains(':'),
        None => authority.contains(':'),
    };
    if has_port {
        format!("{scheme}://{authority}{path}")
    } else {
        format!("{scheme}://{authority}:{DEFAULT_CONTROLLER_PORT}{path}")
    }
}

fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid(kind, name, "name must not be empty"));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid || name.starts_with('-') || name.ends_with('-') {
        return Err(Error::invalid(
            kind,
            name,
            "name may only contain letters, digits, '-', '_' and '.', and cannot start or end with '-'",
        ));
    }
    Ok(())
}

/// Administrative user created on a control plane
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    /// First name
    #[serde(default)]
    pub name: String,
    /// Last name
    #[serde(default)]
    pub surname: String,
    /// Login email
    pub email: String,
    /// Login password
    pub password: String,
}

impl std::fmt::Debug for AdminUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminUser")
            .field("name", &self.name)
            .field("surname", &self.surname)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AdminUser {
    fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(Error::invalid(
                "user",
                &self.email,
                "control plane user requires an email and a password",
            ));
        }
        Ok(())
    }
}

/// SSH access to a remote host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    /// Remote user
    pub user: String,
    /// Private key file
    pub key_file: String,
    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl SshConfig {
    fn validate(&self, kind: &'static str, name: &str) -> Result<()> {
        if self.user.trim().is_empty() || self.key_file.trim().is_empty() {
            return Err(Error::invalid(kind, name, "ssh requires a user and a key file"));
        }
        Ok(())
    }
}

/// Controller running on a remote host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteController {
    /// Controller name
    #[serde(default)]
    pub name: String,
    /// Host to install on
    pub host: String,
    /// SSH access
    pub ssh: SshConfig,
    /// API endpoint once deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Controller replica inside a Kubernetes control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesController {
    /// Controller name
    #[serde(default)]
    pub name: String,
    /// Pod backing the replica
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    /// API endpoint once deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Controller running as a local container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalController {
    /// Controller name
    #[serde(default)]
    pub name: String,
    /// Container image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// API endpoint once deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// A control plane replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Controller {
    /// Kubernetes replica
    Kubernetes(KubernetesController),
    /// Remote host
    Remote(RemoteController),
    /// Local container
    Local(LocalController),
}

impl Controller {
    /// Backend this controller is deployed with
    pub fn backend(&self) -> Backend {
        match self {
            Controller::Kubernetes(_) => Backend::Kubernetes,
            Controller::Remote(_) => Backend::Remote,
            Controller::Local(_) => Backend::Local,
        }
    }

    /// Record the endpoint reported by the installer
    pub fn set_endpoint(&mut self, endpoint: &str) {
        let endpoint = Some(normalize_endpoint(endpoint));
        match self {
            Controller::Kubernetes(c) => c.endpoint = endpoint,
            Controller::Remote(c) => c.endpoint = endpoint,
            Controller::Local(c) => c.endpoint = endpoint,
        }
    }

    /// Rename the controller
    pub fn set_name(&mut self, name: &str) {
        let name = name.to_string();
        match self {
            Controller::Kubernetes(c) => c.name = name,
            Controller::Remote(c) => c.name = name,
            Controller::Local(c) => c.name = name,
        }
    }
}

impl Resource for Controller {
    fn name(&self) -> &str {
        match self {
            Controller::Kubernetes(c) => &c.name,
            Controller::Remote(c) => &c.name,
            Controller::Local(c) => &c.name,
        }
    }

    fn endpoint(&self) -> Option<&str> {
        match self {
            Controller::Kubernetes(c) => c.endpoint.as_deref(),
            Controller::Remote(c) => c.endpoint.as_deref(),
            Controller::Local(c) => c.endpoint.as_deref(),
        }
    }

    fn sanitize(&mut self) {
        match self {
            Controller::Kubernetes(c) => {
                c.name = c.name.trim().to_string();
                c.endpoint = c.endpoint.as_deref().map(normalize_endpoint);
            }
            Controller::Remote(c) => {
                c.name = c.name.trim().to_string();
                c.host = c.host.trim().to_string();
                c.endpoint = c.endpoint.as_deref().map(normalize_endpoint);
            }
            Controller::Local(c) => {
                c.name = c.name.trim().to_string();
                c.endpoint = c.endpoint.as_deref().map(normalize_endpoint);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        validate_name("controller", self.name())?;
        if let Controller::Remote(c) = self {
            if c.host.is_empty() {
                return Err(Error::invalid("controller", &c.name, "host must not be empty"));
            }
            c.ssh.validate("controller", &c.name)?;
        }
        Ok(())
    }
}

/// Control plane installed on remote hosts over SSH
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteControlPlane {
    /// Control plane name
    #[serde(default)]
    pub name: String,
    /// Administrative user
    #[serde(alias = "iofogUser")]
    pub admin: AdminUser,
    /// Controller replicas
    #[serde(default)]
    pub controllers: Vec<RemoteController>,
}

/// Control plane deployed into a Kubernetes cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesControlPlane {
    /// Control plane name
    #[serde(default)]
    pub name: String,
    /// Administrative user
    #[serde(alias = "iofogUser")]
    pub admin: AdminUser,
    /// Kubeconfig file
    pub kube_config: String,
    /// Number of controller replicas
    #[serde(default = "default_replicas")]
    pub replicas: u16,
    /// Replicas observed after deployment
    #[serde(default)]
    pub controllers: Vec<KubernetesController>,
    /// Load balancer endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_replicas() -> u16 {
    1
}

/// Control plane running as a single local container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalControlPlane {
    /// Control plane name
    #[serde(default)]
    pub name: String,
    /// Administrative user
    #[serde(alias = "iofogUser")]
    pub admin: AdminUser,
    /// The only controller
    #[serde(default)]
    pub controller: LocalController,
}

/// The orchestration backend of a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlPlane {
    /// Kubernetes stack
    Kubernetes(KubernetesControlPlane),
    /// Remote SSH-managed hosts
    Remote(RemoteControlPlane),
    /// Local container
    Local(LocalControlPlane),
}

impl ControlPlane {
    /// Backend this control plane is deployed with
    pub fn backend(&self) -> Backend {
        match self {
            ControlPlane::Kubernetes(_) => Backend::Kubernetes,
            ControlPlane::Remote(_) => Backend::Remote,
            ControlPlane::Local(_) => Backend::Local,
        }
    }

    /// Administrative user
    pub fn admin(&self) -> &AdminUser {
        match self {
            ControlPlane::Kubernetes(cp) => &cp.admin,
            ControlPlane::Remote(cp) => &cp.admin,
            ControlPlane::Local(cp) => &cp.admin,
        }
    }

    /// Controllers owned by this control plane
    pub fn controllers(&self) -> Vec<Controller> {
        match self {
            ControlPlane::Kubernetes(cp) => cp
                .controllers
                .iter()
                .cloned()
                .map(Controller::Kubernetes)
                .collect(),
            ControlPlane::Remote(cp) => cp
                .controllers
                .iter()
                .cloned()
                .map(Controller::Remote)
                .collect(),
            ControlPlane::Local(cp) => vec![Controller::Local(cp.controller.clone())],
        }
    }

    /// Look up a controller by name
    pub fn controller(&self, name: &str) -> Option<Controller> {
        self.controllers().into_iter().find(|c| c.name() == name)
    }

    /// Insert or replace a controller; its variant must match the control plane
    pub fn upsert_controller(&mut self, controller: Controller) -> Result<()> {
        match (self, controller) {
            (ControlPlane::Kubernetes(cp), Controller::Kubernetes(c)) => {
                match cp.controllers.iter_mut().find(|x| x.name == c.name) {
                    Some(existing) => *existing = c,
                    None => cp.controllers.push(c),
                }
            }
            (ControlPlane::Remote(cp), Controller::Remote(c)) => {
                match cp.controllers.iter_mut().find(|x| x.name == c.name) {
                    Some(existing) => *existing = c,
                    None => cp.controllers.push(c),
                }
            }
            (ControlPlane::Local(cp), Controller::Local(c)) => {
                if !cp.controller.name.is_empty() && cp.controller.name != c.name {
                    return Err(Error::Conflict(format!(
                        "local control plane already has controller '{}'",
                        cp.controller.name
                    )));
                }
                cp.controller = c;
            }
            (cp, c) => {
                return Err(Error::Conflict(format!(
                    "cannot add {} controller '{}' to a {} control plane",
                    c.backend(),
                    c.name(),
                    cp.backend()
                )));
            }
        }
        Ok(())
    }

    /// Remove a controller by name, returning it
    pub fn remove_controller(&mut self, name: &str) -> Option<Controller> {
        match self {
            ControlPlane::Kubernetes(cp) => {
                let idx = cp.controllers.iter().position(|c| c.name == name)?;
                Some(Controller::Kubernetes(cp.controllers.remove(idx)))
            }
            ControlPlane::Remote(cp) => {
                let idx = cp.controllers.iter().position(|c| c.name == name)?;
                Some(Controller::Remote(cp.controllers.remove(idx)))
            }
            ControlPlane::Local(cp) => {
                if cp.controller.name != name {
                    return None;
                }
                Some(Controller::Local(std::mem::take(&mut cp.controller)))
            }
        }
    }

    /// Set the Kubernetes load balancer endpoint
    pub fn set_endpoint(&mut self, endpoint: &str) {
        if let ControlPlane::Kubernetes(cp) = self {
            cp.endpoint = Some(normalize_endpoint(endpoint));
        }
    }
}

impl Resource for ControlPlane {
    fn name(&self) -> &str {
        match self {
            ControlPlane::Kubernetes(cp) => &cp.name,
            ControlPlane::Remote(cp) => &cp.name,
            ControlPlane::Local(cp) => &cp.name,
        }
    }

    fn endpoint(&self) -> Option<&str> {
        match self {
            ControlPlane::Kubernetes(cp) => cp
                .endpoint
                .as_deref()
                .or_else(|| cp.controllers.iter().find_map(|c| c.endpoint.as_deref())),
            ControlPlane::Remote(cp) => cp.controllers.iter().find_map(|c| c.endpoint.as_deref()),
            ControlPlane::Local(cp) => cp.controller.endpoint.as_deref(),
        }
    }

    fn sanitize(&mut self) {
        match self {
            ControlPlane::Kubernetes(cp) => {
                cp.name = cp.name.trim().to_string();
                cp.admin.email = cp.admin.email.trim().to_string();
                cp.kube_config = cp.kube_config.trim().to_string();
                cp.endpoint = cp.endpoint.as_deref().map(normalize_endpoint);
            }
            ControlPlane::Remote(cp) => {
                cp.name = cp.name.trim().to_string();
                cp.admin.email = cp.admin.email.trim().to_string();
                for ctrl in &mut cp.controllers {
                    let mut wrapped = Controller::Remote(ctrl.clone());
                    wrapped.sanitize();
                    if let Controller::Remote(c) = wrapped {
                        *ctrl = c;
                    }
                }
            }
            ControlPlane::Local(cp) => {
                cp.name = cp.name.trim().to_string();
                cp.admin.email = cp.admin.email.trim().to_string();
                if cp.controller.name.trim().is_empty() {
                    cp.controller.name = format!("{}-controller", cp.name);
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        validate_name("control plane", self.name())?;
        self.admin().validate()?;
        match self {
            ControlPlane::Kubernetes(cp) => {
                if cp.kube_config.is_empty() {
                    return Err(Error::invalid(
                        "control plane",
                        &cp.name,
                        "kubernetes control plane requires a kube config",
                    ));
                }
                if cp.replicas == 0 {
                    return Err(Error::invalid(
                        "control plane",
                        &cp.name,
                        "replicas must be at least 1",
                    ));
                }
            }
            ControlPlane::Remote(cp) => {
                if cp.controllers.is_empty() {
                    return Err(Error::invalid(
                        "control plane",
                        &cp.name,
                        "remote control plane requires at least one controller",
                    ));
                }
            }
            ControlPlane::Local(_) => {}
        }
        let controllers = self.controllers();
        for (idx, ctrl) in controllers.iter().enumerate() {
            ctrl.validate()?;
            if controllers[..idx].iter().any(|c| c.name() == ctrl.name()) {
                return Err(Error::invalid(
                    "control plane",
                    self.name(),
                    format!("duplicate controller name '{}'", ctrl.name()),
                ));
            }
        }
        Ok(())
    }
}

/// Agent software package selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPackage {
    /// Package version
    pub version: String,
    /// Package repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// Agent installed on a remote host over SSH
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAgent {
    /// Agent name
    #[serde(default)]
    pub name: String,
    /// Host to install on
    pub host: String,
    /// SSH access
    pub ssh: SshConfig,
    /// UUID assigned by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Package override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<AgentPackage>,
    /// Router configuration applied to the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentConfiguration>,
}

/// Agent running as a local container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAgent {
    /// Agent name
    #[serde(default)]
    pub name: String,
    /// Container image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// UUID assigned by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Router configuration applied to the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentConfiguration>,
}

/// An edge node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Agent {
    /// Local container
    Local(LocalAgent),
    /// Remote host
    Remote(RemoteAgent),
}

impl Agent {
    /// Backend this agent is deployed with
    pub fn backend(&self) -> Backend {
        match self {
            Agent::Local(_) => Backend::Local,
            Agent::Remote(_) => Backend::Remote,
        }
    }

    /// Host the agent runs on
    pub fn host(&self) -> &str {
        match self {
            Agent::Local(_) => "localhost",
            Agent::Remote(a) => &a.host,
        }
    }

    /// UUID assigned by the controller
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Agent::Local(a) => a.uuid.as_deref(),
            Agent::Remote(a) => a.uuid.as_deref(),
        }
    }

    /// Record the UUID assigned by the controller
    pub fn set_uuid(&mut self, uuid: &str) {
        let uuid = Some(uuid.to_string());
        match self {
            Agent::Local(a) => a.uuid = uuid,
            Agent::Remote(a) => a.uuid = uuid,
        }
    }

    /// Router configuration
    pub fn config(&self) -> Option<&AgentConfiguration> {
        match self {
            Agent::Local(a) => a.config.as_ref(),
            Agent::Remote(a) => a.config.as_ref(),
        }
    }

    /// Replace the router configuration
    pub fn set_config(&mut self, config: AgentConfiguration) {
        match self {
            Agent::Local(a) => a.config = Some(config),
            Agent::Remote(a) => a.config = Some(config),
        }
    }

    /// Rename the agent
    pub fn set_name(&mut self, name: &str) {
        let name = name.to_string();
        match self {
            Agent::Local(a) => a.name = name,
            Agent::Remote(a) => a.name = name,
        }
    }
}

impl Resource for Agent {
    fn name(&self) -> &str {
        match self {
            Agent::Local(a) => &a.name,
            Agent::Remote(a) => &a.name,
        }
    }

    fn endpoint(&self) -> Option<&str> {
        Some(self.host())
    }

    fn sanitize(&mut self) {
        match self {
            Agent::Local(a) => a.name = a.name.trim().to_string(),
            Agent::Remote(a) => {
                a.name = a.name.trim().to_string();
                a.host = a.host.trim().to_string();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        validate_name("agent", self.name())?;
        if let Agent::Remote(a) = self {
            if a.host.is_empty() {
                return Err(Error::invalid("agent", &a.name, "host must not be empty"));
            }
            a.ssh.validate("agent", &a.name)?;
        }
        if let Some(config) = self.config() {
            config.validate(self.name())?;
        }
        Ok(())
    }
}

/// Volume mounted on agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name
    #[serde(default)]
    pub name: String,
    /// Source directory
    pub source: String,
    /// Destination directory on the agents
    pub destination: String,
    /// Unix permissions, e.g. "666"
    #[serde(default = "default_permissions")]
    pub permissions: String,
    /// Agents receiving the volume
    #[serde(default)]
    pub agents: Vec<String>,
}

fn default_permissions() -> String {
    "666".to_string()
}

/// A named, isolated deployment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name
    pub name: String,
    /// When the namespace was created
    pub created: DateTime<Utc>,
    /// Control plane, if deployed
    #[serde(default)]
    pub control_plane: Option<ControlPlane>,
    /// Agents, unique by name
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Volumes
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: Utc::now(),
            control_plane: None,
            agents: Vec::new(),
            volumes: Vec::new(),
        }
    }

    /// Look up an agent by name
    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    /// Whether the namespace has no agents and no control plane
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.control_plane.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh() -> SshConfig {
        SshConfig {
            user: "edge".to_string(),
            key_file: "~/.ssh/id_rsa".to_string(),
            port: DEFAULT_SSH_PORT,
        }
    }

    fn admin() -> AdminUser {
        AdminUser {
            name: "Jane".to_string(),
            surname: "Doe".to_string(),
            email: "jane@example.com".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("10.0.0.1"), "http://10.0.0.1:51121");
        assert_eq!(normalize_endpoint("https://ctrl.example.com:443/"), "https://ctrl.example.com:443");
        assert_eq!(normalize_endpoint("ctrl:8080/api"), "http://ctrl:8080/api");
        assert_eq!(normalize_endpoint("[::1]"), "http://[::1]:51121");
    }

    #[test]
    fn test_admin_debug_redacts_password() {
        let rendered = format!("{:?}", admin());
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_controller_variant_mismatch_is_conflict() {
        let mut cp = ControlPlane::Local(LocalControlPlane {
            name: "cp".to_string(),
            admin: admin(),
            controller: LocalController {
                name: "local".to_string(),
                ..Default::default()
            },
        });
        let err = cp
            .upsert_controller(Controller::Kubernetes(KubernetesController::default()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[test]
    fn test_remote_control_plane_validation() {
        let mut cp = ControlPlane::Remote(RemoteControlPlane {
            name: " cp ".to_string(),
            admin: admin(),
            controllers: vec![],
        });
        cp.sanitize();
        assert_eq!(cp.name(), "cp");
        assert!(cp.validate().is_err());

        let ctrl = RemoteController {
            name: "ctrl-1".to_string(),
            host: "10.0.0.1".to_string(),
            ssh: ssh(),
            endpoint: None,
        };
        cp.upsert_controller(Controller::Remote(ctrl.clone())).unwrap();
        cp.validate().unwrap();

        // Upsert replaces rather than duplicates
        cp.upsert_controller(Controller::Remote(ctrl)).unwrap();
        assert_eq!(cp.controllers().len(), 1);
    }

    #[test]
    fn test_control_plane_endpoint_comes_from_controller() {
        let mut cp = ControlPlane::Remote(RemoteControlPlane {
            name: "cp".to_string(),
            admin: admin(),
            controllers: vec![RemoteController {
                name: "ctrl-1".to_string(),
                host: "10.0.0.1".to_string(),
                ssh: ssh(),
                endpoint: None,
            }],
        });
        assert_eq!(cp.endpoint(), None);
        let mut ctrl = cp.controller("ctrl-1").unwrap();
        ctrl.set_endpoint("10.0.0.1");
        cp.upsert_controller(ctrl).unwrap();
        assert_eq!(cp.endpoint(), Some("http://10.0.0.1:51121"));
    }

    #[test]
    fn test_agent_host_and_validation() {
        let local = Agent::Local(LocalAgent {
            name: "local".to_string(),
            ..Default::default()
        });
        assert_eq!(local.host(), "localhost");
        local.validate().unwrap();

        let remote = Agent::Remote(RemoteAgent {
            name: "bad name".to_string(),
            host: "10.0.0.5".to_string(),
            ssh: ssh(),
            uuid: None,
            package: None,
            config: None,
        });
        assert!(remote.validate().is_err());
    }

    #[test]
    fn test_agent_serialization_is_tagged() {
        let agent = Agent::Local(LocalAgent {
            name: "a1".to_string(),
            uuid: Some("uuid-1".to_string()),
            ..Default::default()
        });
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["type"], "local");
        let back: Agent = serde_json::from_value(json).unwrap();
        assert_eq!(back, agent);
    }
}
