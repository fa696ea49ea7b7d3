//! Volumes and controller-side application resources

use super::{decode, display_name, unexpected_kind};
use crate::kinds::ExecutorSpec;
use crate::{DeployContext, Error, Executor, Result};
use async_trait::async_trait;
use fleet_manifest::Kind;
use fleet_manifest::resources::{
    Application, ApplicationTemplate, CatalogItem, ControllerResource, EdgeResource,
    Microservice, Registry, Route,
};
use fleet_store::{ErrorKind, Volume};
use serde_json::Value;
use tracing::info;

/// Creates or replaces one application-layer resource on the controller
pub struct ApplyResourceExecutor {
    name: String,
    namespace: String,
    kind: Kind,
    resource: String,
    body: Value,
    ctx: DeployContext,
}

fn body_of<T>(spec: &ExecutorSpec) -> Result<Value>
where
    T: ControllerResource + serde::de::DeserializeOwned,
{
    let resource: T = decode(spec)?;
    resource.validate(&spec.name)?;
    Ok(resource.to_body(&spec.name)?)
}

impl ApplyResourceExecutor {
    /// Decode an application-layer document
    pub fn from_spec(ctx: &DeployContext, spec: ExecutorSpec) -> Result<Self> {
        let body = match spec.kind {
            Kind::Microservice => body_of::<Microservice>(&spec)?,
            Kind::Application => body_of::<Application>(&spec)?,
            Kind::ApplicationTemplate => body_of::<ApplicationTemplate>(&spec)?,
            Kind::CatalogItem => body_of::<CatalogItem>(&spec)?,
            Kind::Registry => body_of::<Registry>(&spec)?,
            Kind::Route => body_of::<Route>(&spec)?,
            Kind::EdgeResource => body_of::<EdgeResource>(&spec)?,
            _ => return Err(unexpected_kind(&spec)),
        };
        Ok(Self {
            name: display_name(spec.kind, &spec.name),
            namespace: spec.namespace,
            kind: spec.kind,
            resource: spec.name,
            body,
            ctx: ctx.clone(),
        })
    }
}

#[async_trait]
impl Executor for ApplyResourceExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        info!("Applying {} in namespace '{}'", self.name, self.namespace);
        let client = self.ctx.cache.client(&self.namespace).await?;
        client
            .apply_resource(self.kind, &self.resource, self.body.clone())
            .await
    }
}

/// Records a volume and the agents it is mounted on
pub struct VolumeExecutor {
    name: String,
    namespace: String,
    volume: Volume,
    ctx: DeployContext,
}

impl VolumeExecutor {
    /// Decode a volume document
    pub fn from_spec(ctx: &DeployContext, spec: ExecutorSpec) -> Result<Self> {
        let mut volume: Volume = decode(&spec)?;
        volume.name = spec.name.clone();
        if volume.source.trim().is_empty() || volume.destination.trim().is_empty() {
            return Err(Error::Input(format!(
                "volume '{}' needs a source and a destination",
                spec.name
            )));
        }
        if volume.agents.is_empty() {
            return Err(Error::Input(format!(
                "volume '{}' is not mounted on any agent",
                spec.name
            )));
        }
        Ok(Self {
            name: display_name(spec.kind, &spec.name),
            namespace: spec.namespace,
            volume,
            ctx: ctx.clone(),
        })
    }
}

#[async_trait]
impl Executor for VolumeExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        let ns = &self.namespace;
        for agent in &self.volume.agents {
            match self.ctx.store.get_agent(ns, agent).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(Error::NotFound(format!(
                        "volume '{}' targets unknown agent '{agent}'",
                        self.volume.name
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(
            "Recording volume '{}' on {} agent(s)",
            self.volume.name,
            self.volume.agents.len()
        );
        self.ctx.store.add_volume(ns, self.volume.clone()).await?;
        Ok(())
    }
}
