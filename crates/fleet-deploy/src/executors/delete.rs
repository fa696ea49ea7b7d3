//! Delete-oriented executors
//!
//! Each executor removes one declared resource. A resource that is already
//! gone surfaces as NotFound; the orchestrator decides whether that matters.

use super::display_name;
use crate::kinds::ExecutorSpec;
use crate::runner::Failure;
use crate::{DeployContext, Error, Executor, Result};
use async_trait::async_trait;
use fleet_manifest::Kind;
use fleet_store::{Backend, Resource};
use tracing::{debug, info};

/// What a delete executor removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    ControlPlane(Backend),
    Controller,
    Agent,
    AgentConfig,
    Volume,
    ControllerResource(Kind),
}

/// Removes one declared resource
pub struct DeleteExecutor {
    name: String,
    namespace: String,
    resource: String,
    target: Target,
    ctx: DeployContext,
}

impl DeleteExecutor {
    /// Build the delete counterpart of a document
    pub fn from_spec(ctx: &DeployContext, spec: ExecutorSpec) -> Result<Self> {
        let target = match spec.kind {
            Kind::KubernetesControlPlane => Target::ControlPlane(Backend::Kubernetes),
            Kind::RemoteControlPlane => Target::ControlPlane(Backend::Remote),
            Kind::LocalControlPlane => Target::ControlPlane(Backend::Local),
            k if k.is_controller() => Target::Controller,
            k if k.is_agent() => Target::Agent,
            Kind::AgentConfig => Target::AgentConfig,
            Kind::Volume => Target::Volume,
            other => Target::ControllerResource(other),
        };
        Ok(Self {
            name: display_name(spec.kind, &spec.name),
            namespace: spec.namespace,
            resource: spec.name,
            target,
            ctx: ctx.clone(),
        })
    }

    async fn delete_control_plane(&self, backend: Backend) -> Result<()> {
        let ns = &self.namespace;
        let control_plane = self.ctx.store.get_control_plane(ns).await?;
        if control_plane.backend() != backend {
            return Err(Error::Conflict(format!(
                "namespace '{ns}' has a {} control plane, not a {backend} one",
                control_plane.backend()
            )));
        }

        let installer = self.ctx.installers.for_backend(backend);
        let controllers = control_plane.controllers();
        let removals = controllers.iter().map(|controller| {
            let installer = installer.clone();
            let control_plane = &control_plane;
            async move {
                installer
                    .uninstall_controller(ns, control_plane, controller)
                    .await
            }
        });
        let outcomes = futures::future::join_all(removals).await;

        let failures: Vec<Failure> = controllers
            .iter()
            .zip(outcomes)
            .filter_map(|(controller, outcome)| {
                outcome
                    .err()
                    .map(|e| Failure::new(display_name("Controller", controller.name()), e))
            })
            .collect();
        if !failures.is_empty() {
            return Err(Error::Stage {
                stage: format!("control plane '{}'", control_plane.name()),
                failures,
            });
        }

        self.ctx.store.delete_control_plane(ns).await?;
        self.ctx.cache.invalidate(ns).await;
        Ok(())
    }

    async fn delete_controller(&self) -> Result<()> {
        let ns = &self.namespace;
        let control_plane = self.ctx.store.get_control_plane(ns).await?;
        let controller = control_plane.controller(&self.resource).ok_or_else(|| {
            Error::NotFound(format!(
                "controller '{}' not found in namespace '{ns}'",
                self.resource
            ))
        })?;
        self.ctx
            .installers
            .for_backend(controller.backend())
            .uninstall_controller(ns, &control_plane, &controller)
            .await?;
        self.ctx.store.delete_controller(ns, &self.resource).await?;
        self.ctx.cache.invalidate(ns).await;
        Ok(())
    }

    async fn delete_agent(&self) -> Result<()> {
        let ns = &self.namespace;
        let agent = self.ctx.store.get_agent(ns, &self.resource).await?;

        match self.deregister().await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Agent '{}' is not registered on a controller", self.resource);
            }
            Err(e) => return Err(e),
        }

        self.ctx
            .installers
            .for_backend(agent.backend())
            .uninstall_agent(ns, &agent)
            .await?;
        self.ctx.store.delete_agent(ns, &self.resource).await?;
        Ok(())
    }

    /// Remove the agent from the controller
    async fn deregister(&self) -> Result<()> {
        let ns = &self.namespace;
        let client = self.ctx.cache.client(ns).await?;
        let info = client.get_agent_by_name(&self.resource).await?;
        client.delete_agent(&info.uuid).await?;
        self.ctx.cache.invalidate_agents(ns).await;
        Ok(())
    }

    async fn delete_volume(&self) -> Result<()> {
        self.ctx
            .store
            .delete_volume(&self.namespace, &self.resource)
            .await?;
        Ok(())
    }

    async fn delete_controller_resource(&self, kind: Kind) -> Result<()> {
        let client = self.ctx.cache.client(&self.namespace).await?;
        client.delete_resource(kind, &self.resource).await
    }
}

#[async_trait]
impl Executor for DeleteExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        info!("Deleting {} from namespace '{}'", self.name, self.namespace);
        match self.target {
            Target::ControlPlane(backend) => self.delete_control_plane(backend).await,
            Target::Controller => self.delete_controller().await,
            Target::Agent => self.delete_agent().await,
            Target::AgentConfig => {
                // The installed software stays until the agent itself is deleted
                self.deregister().await
            }
            Target::Volume => self.delete_volume().await,
            Target::ControllerResource(kind) => self.delete_controller_resource(kind).await,
        }
    }
}
