//! Per-backend installers
//!
//! Installers create and remove the processes behind controllers and
//! agents. The engine treats them as opaque: it hands over a resource and
//! gets an endpoint back.

use crate::{Error, Result};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use fleet_store::{
    Agent, Backend, ControlPlane, Controller, DEFAULT_CONTROLLER_PORT, Resource, SshConfig,
    normalize_endpoint,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Installs controllers and agents for one backend
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install a controller of `control_plane`, returning its endpoint
    async fn install_controller(
        &self,
        namespace: &str,
        control_plane: &ControlPlane,
        controller: &Controller,
    ) -> Result<String>;

    /// Remove a controller
    async fn uninstall_controller(
        &self,
        namespace: &str,
        control_plane: &ControlPlane,
        controller: &Controller,
    ) -> Result<()>;

    /// Install an agent and provision it against the controller
    async fn install_agent(
        &self,
        namespace: &str,
        agent: &Agent,
        controller_endpoint: &str,
        provisioning_key: &str,
    ) -> Result<()>;

    /// Remove an agent
    async fn uninstall_agent(&self, namespace: &str, agent: &Agent) -> Result<()>;
}

/// One installer per backend
#[derive(Clone)]
pub struct Installers {
    /// Local container engine
    pub local: Arc<dyn Installer>,
    /// SSH-managed hosts
    pub remote: Arc<dyn Installer>,
    /// Kubernetes clusters
    pub kubernetes: Arc<dyn Installer>,
}

impl Installers {
    /// Shell out to `docker`, `ssh` and `kubectl`
    pub fn commands() -> Self {
        Self {
            local: Arc::new(CommandInstaller::new(Backend::Local)),
            remote: Arc::new(CommandInstaller::new(Backend::Remote)),
            kubernetes: Arc::new(CommandInstaller::new(Backend::Kubernetes)),
        }
    }

    /// Use the same installer for every backend
    pub fn uniform(installer: Arc<dyn Installer>) -> Self {
        Self {
            local: installer.clone(),
            remote: installer.clone(),
            kubernetes: installer,
        }
    }

    /// Installer for `backend`
    pub fn for_backend(&self, backend: Backend) -> Arc<dyn Installer> {
        match backend {
            Backend::Local => self.local.clone(),
            Backend::Remote => self.remote.clone(),
            Backend::Kubernetes => self.kubernetes.clone(),
        }
    }
}

/// Default controller image
pub const DEFAULT_CONTROLLER_IMAGE: &str = "edgefleet/controller:latest";

/// Default agent image
pub const DEFAULT_AGENT_IMAGE: &str = "edgefleet/agent:latest";

/// A command line ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Program to run
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment
    pub env: Vec<(String, String)>,
}

impl Invocation {
    fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    /// Run to completion and return trimmed stdout
    pub async fn run(&self) -> Result<String> {
        debug!("Running {} {}", self.program, self.args.join(" "));
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| Error::Internal(format!("failed to spawn {}: {e}", self.program)))?;
        if !output.status.success() {
            return Err(Error::Internal(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Installer shelling out to the backend's command-line tool
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    backend: Backend,
    docker: String,
    ssh: String,
    kubectl: String,
}

impl CommandInstaller {
    /// Installer for `backend` using the tools found on `PATH`
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            docker: "docker".to_string(),
            ssh: "ssh".to_string(),
            kubectl: "kubectl".to_string(),
        }
    }

    fn container_name(namespace: &str, role: &str, name: &str) -> String {
        format!("edgefleet-{namespace}-{role}-{name}")
    }

    fn ssh(&self, ssh: &SshConfig, host: &str, remote_command: String) -> Invocation {
        Invocation::new(&self.ssh)
            .arg("-i")
            .arg(ssh.key_file.clone())
            .arg("-p")
            .arg(ssh.port.to_string())
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg(format!("{}@{}", ssh.user, host))
            .arg(remote_command)
    }

    fn kubectl(&self, kube_config: &str, namespace: &str) -> Invocation {
        Invocation::new(&self.kubectl)
            .arg("--kubeconfig")
            .arg(kube_config)
            .arg("--namespace")
            .arg(namespace)
    }

    /// Commands installing `controller`; the endpoint is resolved afterwards
    pub fn controller_install_plan(
        &self,
        namespace: &str,
        control_plane: &ControlPlane,
        controller: &Controller,
    ) -> Result<Vec<Invocation>> {
        let admin = control_plane.admin();
        let plan = match (control_plane, controller) {
            (ControlPlane::Local(_), Controller::Local(c)) => vec![
                Invocation::new(&self.docker)
                    .arg("run")
                    .arg("--detach")
                    .arg("--name")
                    .arg(Self::container_name(namespace, "controller", &c.name))
                    .arg("--publish")
                    .arg(format!("{DEFAULT_CONTROLLER_PORT}:{DEFAULT_CONTROLLER_PORT}"))
                    .arg("--env")
                    .arg("ADMIN_EMAIL")
                    .arg("--env")
                    .arg("ADMIN_PASSWORD")
                    .arg(c.image.clone().unwrap_or_else(|| DEFAULT_CONTROLLER_IMAGE.to_string()))
                    .env("ADMIN_EMAIL", admin.email.clone())
                    .env("ADMIN_PASSWORD", admin.password.clone()),
            ],
            (ControlPlane::Remote(_), Controller::Remote(c)) => vec![self.ssh(
                &c.ssh,
                &c.host,
                format!("sudo edgefleet-node controller install --namespace {namespace}"),
            )],
            (ControlPlane::Kubernetes(cp), Controller::Kubernetes(_)) => vec![
                self.kubectl(&cp.kube_config, namespace)
                    .arg("create")
                    .arg("deployment")
                    .arg("edgefleet-controller")
                    .arg(format!("--image={DEFAULT_CONTROLLER_IMAGE}"))
                    .arg(format!("--replicas={}", cp.replicas)),
                self.kubectl(&cp.kube_config, namespace)
                    .arg("expose")
                    .arg("deployment")
                    .arg("edgefleet-controller")
                    .arg("--type=LoadBalancer")
                    .arg(format!("--port={DEFAULT_CONTROLLER_PORT}")),
            ],
            (cp, c) => {
                return Err(Error::Internal(format!(
                    "{} controller '{}' cannot be installed for a {} control plane",
                    c.backend(),
                    c.name(),
                    cp.backend()
                )));
            }
        };
        Ok(plan)
    }

    /// Command installing `agent`
    pub fn agent_install_plan(
        &self,
        namespace: &str,
        agent: &Agent,
        controller_endpoint: &str,
        provisioning_key: &str,
    ) -> Invocation {
        match agent {
            Agent::Local(a) => Invocation::new(&self.docker)
                .arg("run")
                .arg("--detach")
                .arg("--name")
                .arg(Self::container_name(namespace, "agent", &a.name))
                .arg("--env")
                .arg(format!("CONTROLLER_URL={controller_endpoint}"))
                .arg("--env")
                .arg("PROVISIONING_KEY")
                .arg(a.image.clone().unwrap_or_else(|| DEFAULT_AGENT_IMAGE.to_string()))
                .env("PROVISIONING_KEY", provisioning_key),
            Agent::Remote(a) => {
                let version = a
                    .package
                    .as_ref()
                    .map(|p| format!(" --version {}", p.version))
                    .unwrap_or_default();
                self.ssh(
                    &a.ssh,
                    &a.host,
                    format!(
                        "sudo edgefleet-node agent install{version} --controller {controller_endpoint} --key {provisioning_key}"
                    ),
                )
            }
        }
    }

    fn check_backend(&self, backend: Backend) -> Result<()> {
        if backend != self.backend {
            return Err(Error::Internal(format!(
                "{} installer asked to handle a {} resource",
                self.backend, backend
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install_controller(
        &self,
        namespace: &str,
        control_plane: &ControlPlane,
        controller: &Controller,
    ) -> Result<String> {
        self.check_backend(controller.backend())?;
        info!("Installing {} controller '{}'", self.backend, controller.name());
        for invocation in self.controller_install_plan(namespace, control_plane, controller)? {
            invocation.run().await?;
        }

        let endpoint = match (control_plane, controller) {
            (_, Controller::Local(_)) => format!("http://localhost:{DEFAULT_CONTROLLER_PORT}"),
            (_, Controller::Remote(c)) => normalize_endpoint(&c.host),
            (ControlPlane::Kubernetes(cp), Controller::Kubernetes(_)) => {
                let ip = self
                    .kubectl(&cp.kube_config, namespace)
                    .arg("get")
                    .arg("service")
                    .arg("edgefleet-controller")
                    .arg("--output=jsonpath={.status.loadBalancer.ingress[0].ip}")
                    .run()
                    .await?;
                if ip.is_empty() {
                    return Err(Error::Internal(
                        "controller service has no load balancer address".to_string(),
                    ));
                }
                normalize_endpoint(&ip)
            }
            (_, Controller::Kubernetes(c)) => {
                return Err(Error::Internal(format!(
                    "kubernetes controller '{}' outside a kubernetes control plane",
                    c.name
                )));
            }
        };
        Ok(endpoint)
    }

    async fn uninstall_controller(
        &self,
        namespace: &str,
        control_plane: &ControlPlane,
        controller: &Controller,
    ) -> Result<()> {
        self.check_backend(controller.backend())?;
        info!("Removing {} controller '{}'", self.backend, controller.name());
        let invocation = match (control_plane, controller) {
            (_, Controller::Local(c)) => Invocation::new(&self.docker)
                .arg("rm")
                .arg("--force")
                .arg(Self::container_name(namespace, "controller", &c.name)),
            (_, Controller::Remote(c)) => self.ssh(
                &c.ssh,
                &c.host,
                "sudo edgefleet-node controller uninstall".to_string(),
            ),
            (ControlPlane::Kubernetes(cp), Controller::Kubernetes(_)) => self
                .kubectl(&cp.kube_config, namespace)
                .arg("delete")
                .arg("deployment,service")
                .arg("edgefleet-controller")
                .arg("--ignore-not-found"),
            (cp, c) => {
                return Err(Error::Internal(format!(
                    "{} controller '{}' cannot be removed from a {} control plane",
                    c.backend(),
                    c.name(),
                    cp.backend()
                )));
            }
        };
        invocation.run().await?;
        Ok(())
    }

    async fn install_agent(
        &self,
        namespace: &str,
        agent: &Agent,
        controller_endpoint: &str,
        provisioning_key: &str,
    ) -> Result<()> {
        self.check_backend(agent.backend())?;
        info!("Installing {} agent '{}'", self.backend, agent.name());
        self.agent_install_plan(namespace, agent, controller_endpoint, provisioning_key)
            .run()
            .await?;
        Ok(())
    }

    async fn uninstall_agent(&self, namespace: &str, agent: &Agent) -> Result<()> {
        self.check_backend(agent.backend())?;
        info!("Removing {} agent '{}'", self.backend, agent.name());
        let invocation = match agent {
            Agent::Local(a) => Invocation::new(&self.docker)
                .arg("rm")
                .arg("--force")
                .arg(Self::container_name(namespace, "agent", &a.name)),
            Agent::Remote(a) => self.ssh(
                &a.ssh,
                &a.host,
                "sudo edgefleet-node agent uninstall".to_string(),
            ),
        };
        invocation.run().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_store::{
        AdminUser, KubernetesControlPlane, KubernetesController, LocalAgent, RemoteAgent,
        RemoteController, RemoteControlPlane,
    };

    fn admin() -> AdminUser {
        AdminUser {
            email: "admin@example.com".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        }
    }

    fn ssh() -> SshConfig {
        SshConfig {
            user: "deploy".to_string(),
            key_file: "/keys/id_rsa".to_string(),
            port: 2222,
        }
    }

    #[test]
    fn test_remote_controller_uses_ssh() {
        let controller = RemoteController {
            name: "alpha".to_string(),
            host: "10.0.0.10".to_string(),
            ssh: ssh(),
            endpoint: None,
        };
        let cp = ControlPlane::Remote(RemoteControlPlane {
            name: "ecn".to_string(),
            admin: admin(),
            controllers: vec![controller.clone()],
        });
        let installer = CommandInstaller::new(Backend::Remote);
        let plan = installer
            .controller_install_plan("edge", &cp, &Controller::Remote(controller))
            .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].program, "ssh");
        assert!(plan[0].args.contains(&"deploy@10.0.0.10".to_string()));
        assert!(plan[0].args.contains(&"2222".to_string()));
    }

    #[test]
    fn test_kubernetes_plan_scales_replicas() {
        let cp = ControlPlane::Kubernetes(KubernetesControlPlane {
            name: "k8s".to_string(),
            admin: admin(),
            kube_config: "/kube/config".to_string(),
            replicas: 3,
            controllers: vec![],
            endpoint: None,
        });
        let installer = CommandInstaller::new(Backend::Kubernetes);
        let plan = installer
            .controller_install_plan(
                "edge",
                &cp,
                &Controller::Kubernetes(KubernetesController::default()),
            )
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert!(plan[0].args.contains(&"--replicas=3".to_string()));
        assert!(plan[0].args.contains(&"/kube/config".to_string()));
    }

    #[test]
    fn test_secrets_stay_out_of_arguments() {
        let agent = Agent::Local(LocalAgent {
            name: "local".to_string(),
            ..Default::default()
        });
        let installer = CommandInstaller::new(Backend::Local);
        let invocation =
            installer.agent_install_plan("edge", &agent, "http://localhost:51121", "key-123");

        assert!(!invocation.args.iter().any(|a| a.contains("key-123")));
        assert_eq!(
            invocation.env,
            vec![("PROVISIONING_KEY".to_string(), "key-123".to_string())]
        );
        assert!(invocation.args.contains(&"edgefleet-edge-agent-local".to_string()));
    }

    #[test]
    fn test_remote_agent_carries_package_version() {
        let agent = Agent::Remote(RemoteAgent {
            name: "r1".to_string(),
            host: "10.0.0.11".to_string(),
            ssh: ssh(),
            uuid: None,
            package: Some(fleet_store::AgentPackage {
                version: "3.1.0".to_string(),
                repo: None,
            }),
            config: None,
        });
        let installer = CommandInstaller::new(Backend::Remote);
        let invocation = installer.agent_install_plan("edge", &agent, "http://ctl:51121", "k");
        let remote = invocation.args.last().unwrap();
        assert!(remote.contains("--version 3.1.0"));
        assert!(remote.contains("--controller http://ctl:51121"));
    }

    #[smol_potat::test]
    async fn test_wrong_backend_is_rejected() {
        let installer = CommandInstaller::new(Backend::Remote);
        let agent = Agent::Local(LocalAgent::default());
        let err = installer.uninstall_agent("edge", &agent).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
