//! Control plane deployment

use super::{decode, display_name, unexpected_kind};
use crate::kinds::ExecutorSpec;
use crate::runner::Failure;
use crate::{DeployContext, Error, Executor, Result};
use async_trait::async_trait;
use fleet_manifest::Kind;
use fleet_store::{
    ControlPlane, Controller, ErrorKind, KubernetesControlPlane, KubernetesController,
    LocalControlPlane, RemoteControlPlane, Resource,
};
use tracing::{info, warn};

/// Deploys a control plane and all of its controllers
pub struct ControlPlaneExecutor {
    name: String,
    namespace: String,
    control_plane: ControlPlane,
    ctx: DeployContext,
}

impl ControlPlaneExecutor {
    /// Wrap an already validated control plane
    pub fn new(ctx: DeployContext, namespace: &str, control_plane: ControlPlane) -> Self {
        let kind = match control_plane.backend() {
            fleet_store::Backend::Kubernetes => Kind::KubernetesControlPlane,
            fleet_store::Backend::Remote => Kind::RemoteControlPlane,
            fleet_store::Backend::Local => Kind::LocalControlPlane,
        };
        Self {
            name: display_name(kind, control_plane.name()),
            namespace: namespace.to_string(),
            control_plane,
            ctx,
        }
    }

    /// Decode a control plane document
    pub fn from_spec(ctx: &DeployContext, spec: ExecutorSpec) -> Result<Self> {
        let mut control_plane = match spec.kind {
            Kind::RemoteControlPlane => {
                let mut cp: RemoteControlPlane = decode(&spec)?;
                cp.name = spec.name.clone();
                ControlPlane::Remote(cp)
            }
            Kind::KubernetesControlPlane => {
                let mut cp: KubernetesControlPlane = decode(&spec)?;
                cp.name = spec.name.clone();
                ControlPlane::Kubernetes(cp)
            }
            Kind::LocalControlPlane => {
                let mut cp: LocalControlPlane = decode(&spec)?;
                cp.name = spec.name.clone();
                if cp.controller.name.is_empty() {
                    cp.controller.name = spec.name.clone();
                }
                ControlPlane::Local(cp)
            }
            _ => return Err(unexpected_kind(&spec)),
        };
        control_plane.sanitize();
        control_plane.validate()?;
        Ok(Self::new(ctx.clone(), &spec.namespace, control_plane))
    }

    /// Controllers to install
    fn planned_controllers(&self) -> Vec<Controller> {
        match &self.control_plane {
            // The replicas sit behind one service
            ControlPlane::Kubernetes(cp) if cp.controllers.is_empty() => {
                vec![Controller::Kubernetes(KubernetesController {
                    name: cp.name.clone(),
                    ..Default::default()
                })]
            }
            cp => cp.controllers(),
        }
    }
}

#[async_trait]
impl Executor for ControlPlaneExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        let ns = &self.namespace;
        match self.ctx.store.get_control_plane(ns).await {
            Ok(existing) if existing.backend() != self.control_plane.backend() => {
                return Err(Error::Conflict(format!(
                    "namespace '{ns}' already has a {} control plane; delete it before deploying a {} one",
                    existing.backend(),
                    self.control_plane.backend()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!("Deploying {} in namespace '{}'", self.name, ns);
        let installer = self.ctx.installers.for_backend(self.control_plane.backend());
        let controllers = self.planned_controllers();

        // Replicas install concurrently; every outcome is kept
        let installs = controllers.iter().map(|controller| {
            let installer = installer.clone();
            async move {
                installer
                    .install_controller(ns, &self.control_plane, controller)
                    .await
            }
        });
        let outcomes = futures::future::join_all(installs).await;

        let mut control_plane = self.control_plane.clone();
        let failures = record_controllers(&mut control_plane, controllers, outcomes);

        // Installed controllers are recorded even when siblings failed
        self.ctx.store.set_control_plane(ns, control_plane).await?;
        self.ctx.cache.invalidate(ns).await;

        if !failures.is_empty() {
            return Err(Error::Stage {
                stage: format!("control plane '{}'", self.control_plane.name()),
                failures,
            });
        }
        info!("{} is ready", self.name);
        Ok(())
    }
}

/// Fold install outcomes into `control_plane`, returning the controllers
/// that could not be recorded
fn record_controllers(
    control_plane: &mut ControlPlane,
    controllers: Vec<Controller>,
    outcomes: Vec<Result<String>>,
) -> Vec<Failure> {
    let mut failures = Vec::new();
    for (mut controller, outcome) in controllers.into_iter().zip(outcomes) {
        let name = display_name("Controller", controller.name());
        let endpoint = match outcome {
            Ok(endpoint) => endpoint,
            Err(error) => {
                warn!("Controller '{}' failed: {}", controller.name(), error);
                failures.push(Failure::new(name, error));
                continue;
            }
        };
        controller.set_endpoint(&endpoint);
        if matches!(control_plane, ControlPlane::Kubernetes(_)) {
            control_plane.set_endpoint(&endpoint);
        }
        if let Err(error) = control_plane.upsert_controller(controller) {
            warn!("Cannot record {}: {}", name, error);
            failures.push(Failure::new(name, error.into()));
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::Installers;
    use crate::testing::{EventLog, FakeControllerClient, FakeFactory, RecordingInstaller};
    use fleet_store::{LocalController, Namespace, NamespaceStore, StoreBackend};
    use std::sync::Arc;

    /// Backend whose reads always fail
    struct BrokenBackend;

    #[async_trait]
    impl StoreBackend for BrokenBackend {
        async fn init(&self) -> fleet_store::Result<()> {
            Ok(())
        }

        async fn put_namespace(&self, _namespace: &Namespace) -> fleet_store::Result<()> {
            Ok(())
        }

        async fn get_namespace(&self, _name: &str) -> fleet_store::Result<Option<Namespace>> {
            Err(fleet_store::Error::Internal("disk unreadable".to_string()))
        }

        async fn list_namespaces(&self) -> fleet_store::Result<Vec<Namespace>> {
            Ok(Vec::new())
        }

        async fn remove_namespace(&self, _name: &str) -> fleet_store::Result<Option<Namespace>> {
            Ok(None)
        }

        async fn flush(&self) -> fleet_store::Result<()> {
            Ok(())
        }
    }

    fn local(controller: &str) -> ControlPlane {
        let yaml = format!(
            "name: local\nadmin:\n  email: admin@example.com\n  password: secret\ncontroller:\n  name: {controller}\n"
        );
        ControlPlane::Local(serde_yaml::from_str::<LocalControlPlane>(&yaml).unwrap())
    }

    #[smol_potat::test]
    async fn test_store_read_failure_stops_before_installing() {
        let log = EventLog::new();
        let client = Arc::new(FakeControllerClient::new(log.clone()));
        let ctx = DeployContext::new(
            Arc::new(NamespaceStore::with_backend(BrokenBackend)),
            Arc::new(FakeFactory::new(client)),
            Installers::uniform(Arc::new(RecordingInstaller::new(log.clone()))),
        );
        let executor = ControlPlaneExecutor::new(ctx, "edge", local("local"));

        let err = executor.execute().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_unrecordable_controller_is_a_failure() {
        let mut control_plane = local("local");
        let controllers = vec![
            Controller::Local(LocalController {
                name: "local".to_string(),
                ..Default::default()
            }),
            Controller::Local(LocalController {
                name: "intruder".to_string(),
                ..Default::default()
            }),
        ];
        let outcomes = vec![
            Ok("http://localhost:51121".to_string()),
            Ok("http://localhost:51122".to_string()),
        ];

        let failures = record_controllers(&mut control_plane, controllers, outcomes);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].executor, "Controller intruder");
        assert_eq!(failures[0].error.kind(), ErrorKind::Conflict);
        assert_eq!(control_plane.controllers()[0].endpoint(), Some("http://localhost:51121"));
    }
}
