//! Standalone controller deployment

use super::{decode, display_name, unexpected_kind};
use crate::kinds::ExecutorSpec;
use crate::{DeployContext, Error, Executor, Result};
use async_trait::async_trait;
use fleet_manifest::Kind;
use fleet_store::{
    Controller, KubernetesController, LocalController, RemoteController, Resource,
};
use tracing::info;

/// Adds one controller to the namespace's existing control plane
pub struct ControllerExecutor {
    name: String,
    namespace: String,
    controller: Controller,
    ctx: DeployContext,
}

impl ControllerExecutor {
    /// Decode a controller document
    pub fn from_spec(ctx: &DeployContext, spec: ExecutorSpec) -> Result<Self> {
        let mut controller = match spec.kind {
            Kind::RemoteController => Controller::Remote(decode::<RemoteController>(&spec)?),
            Kind::KubernetesController => {
                Controller::Kubernetes(decode::<KubernetesController>(&spec)?)
            }
            Kind::LocalController => Controller::Local(decode::<LocalController>(&spec)?),
            _ => return Err(unexpected_kind(&spec)),
        };
        controller.set_name(&spec.name);
        controller.sanitize();
        controller.validate()?;
        Ok(Self {
            name: display_name(spec.kind, &spec.name),
            namespace: spec.namespace,
            controller,
            ctx: ctx.clone(),
        })
    }
}

#[async_trait]
impl Executor for ControllerExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        let ns = &self.namespace;
        let control_plane = self.ctx.store.get_control_plane(ns).await?;
        if control_plane.backend() != self.controller.backend() {
            return Err(Error::Conflict(format!(
                "{} cannot join the {} control plane of namespace '{ns}'",
                self.name,
                control_plane.backend()
            )));
        }

        info!("Deploying {} in namespace '{}'", self.name, ns);
        let endpoint = self
            .ctx
            .installers
            .for_backend(self.controller.backend())
            .install_controller(ns, &control_plane, &self.controller)
            .await?;

        let mut controller = self.controller.clone();
        controller.set_endpoint(&endpoint);
        self.ctx.store.update_controller(ns, controller).await?;
        self.ctx.cache.invalidate(ns).await;
        Ok(())
    }
}
