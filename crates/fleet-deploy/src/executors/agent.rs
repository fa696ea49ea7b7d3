//! Agent deployment

use super::agent_config::register;
use super::{decode, display_name, unexpected_kind};
use crate::kinds::ExecutorSpec;
use crate::{DeployContext, Error, Executor, Result};
use async_trait::async_trait;
use fleet_manifest::Kind;
use fleet_store::{Agent, LocalAgent, RemoteAgent, Resource};
use tracing::info;

/// Installs an agent and provisions it against the namespace's controller
pub struct AgentExecutor {
    name: String,
    namespace: String,
    agent: Agent,
    ctx: DeployContext,
}

impl AgentExecutor {
    /// Wrap an already validated agent
    pub fn new(ctx: DeployContext, namespace: &str, agent: Agent) -> Self {
        let kind = match agent {
            Agent::Local(_) => Kind::LocalAgent,
            Agent::Remote(_) => Kind::RemoteAgent,
        };
        Self {
            name: display_name(kind, agent.name()),
            namespace: namespace.to_string(),
            agent,
            ctx,
        }
    }

    /// Decode an agent document
    pub fn from_spec(ctx: &DeployContext, spec: ExecutorSpec) -> Result<Self> {
        let mut agent = match spec.kind {
            Kind::RemoteAgent => Agent::Remote(decode::<RemoteAgent>(&spec)?),
            Kind::LocalAgent => Agent::Local(decode::<LocalAgent>(&spec)?),
            _ => return Err(unexpected_kind(&spec)),
        };
        agent.set_name(&spec.name);
        agent.sanitize();
        if let Some(config) = agent.config().filter(|c| c.host.is_none()) {
            let mut config = config.clone();
            config.host = Some(agent.host().to_string());
            agent.set_config(config);
        }
        agent.validate()?;
        Ok(Self::new(ctx.clone(), &spec.namespace, agent))
    }

    /// Namespace the agent is deployed into
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl Executor for AgentExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        let ns = &self.namespace;
        let control_plane = self.ctx.store.get_control_plane(ns).await?;
        let endpoint = control_plane
            .endpoint()
            .ok_or_else(|| {
                Error::NotFound(format!("control plane of namespace '{ns}' has no endpoint"))
            })?
            .to_string();

        let client = self.ctx.cache.client(ns).await?;
        let info = match client.get_agent_by_name(self.agent.name()).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                let config = self.agent.config().cloned().unwrap_or_default();
                register(&self.ctx, ns, self.agent.name(), &config).await?
            }
            Err(e) => return Err(e),
        };

        info!("Deploying {} in namespace '{}'", self.name, ns);
        let key = client.provision_key(&info.uuid).await?;
        self.ctx
            .installers
            .for_backend(self.agent.backend())
            .install_agent(ns, &self.agent, &endpoint, &key)
            .await?;

        let mut agent = self.agent.clone();
        agent.set_uuid(&info.uuid);
        self.ctx.store.update_agent(ns, agent).await?;
        self.ctx.cache.invalidate_agents(ns).await;
        Ok(())
    }

    fn agent(&self) -> Option<&Agent> {
        Some(&self.agent)
    }
}
