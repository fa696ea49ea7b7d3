//! Agent router configuration

use super::{decode, display_name};
use crate::client::{AgentInfo, AgentRegistration};
use crate::kinds::ExecutorSpec;
use crate::{AgentConfigDecl, DeployContext, Error, Executor, Result};
use async_trait::async_trait;
use fleet_manifest::Kind;
use fleet_store::{AgentConfiguration, DEFAULT_ROUTER_NAME, ErrorKind};
use tracing::{debug, info};

/// Registers an agent and its router configuration on the controller
pub struct AgentConfigExecutor {
    name: String,
    decl: AgentConfigDecl,
    ctx: DeployContext,
}

impl AgentConfigExecutor {
    /// Configure agent `name` of `namespace`
    pub fn new(ctx: DeployContext, namespace: &str, name: &str, config: AgentConfiguration) -> Self {
        Self {
            name: display_name(Kind::AgentConfig, name),
            decl: AgentConfigDecl {
                namespace: namespace.to_string(),
                name: name.to_string(),
                config,
            },
            ctx,
        }
    }

    /// Decode an `AgentConfig` document.
    ///
    /// The host may be left out; the orchestrator fills it in from the agent
    /// before anything runs.
    pub fn from_spec(ctx: &DeployContext, spec: ExecutorSpec) -> Result<Self> {
        let config: AgentConfiguration = decode(&spec)?;
        config.validate_routing(&spec.name)?;
        Ok(Self::new(ctx.clone(), &spec.namespace, &spec.name, config))
    }
}

#[async_trait]
impl Executor for AgentConfigExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        let ns = &self.decl.namespace;
        self.decl.config.validate(&self.decl.name)?;
        let info = register(&self.ctx, ns, &self.decl.name, &self.decl.config).await?;

        // Keep the store in step for agents deployed earlier
        match self.ctx.store.get_agent(ns, &self.decl.name).await {
            Ok(mut agent) => {
                agent.set_uuid(&info.uuid);
                agent.set_config(self.decl.config.clone());
                self.ctx.store.update_agent(ns, agent).await?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn agent_config(&self) -> Option<&AgentConfigDecl> {
        Some(&self.decl)
    }
}

/// Create or update agent `name` on the controller of `namespace`
pub(crate) async fn register(
    ctx: &DeployContext,
    namespace: &str,
    name: &str,
    config: &AgentConfiguration,
) -> Result<AgentInfo> {
    let client = ctx.cache.client(namespace).await?;
    let agents = ctx.cache.agents(namespace).await?;
    let registration = AgentRegistration {
        name: name.to_string(),
        config: with_controller_refs(config, &agents, name)?,
    };

    let info = match client.get_agent_by_name(name).await {
        Ok(existing) => {
            info!("Updating agent '{}' in namespace '{}'", name, namespace);
            client.update_agent(&existing.uuid, &registration).await?
        }
        Err(e) if e.is_not_found() => {
            info!("Registering agent '{}' in namespace '{}'", name, namespace);
            client.create_agent(&registration).await?
        }
        Err(e) => return Err(e),
    };
    ctx.cache.invalidate_agents(namespace).await;
    Ok(info)
}

/// Rewrite router references from agent names to controller UUIDs
fn with_controller_refs(
    config: &AgentConfiguration,
    agents: &[AgentInfo],
    name: &str,
) -> Result<AgentConfiguration> {
    let translate = |reference: &str| -> Result<String> {
        if let Some(agent) = agents
            .iter()
            .find(|a| a.name == reference || a.uuid == reference)
        {
            return Ok(agent.uuid.clone());
        }
        if reference == DEFAULT_ROUTER_NAME {
            debug!("Leaving '{}' for the controller to resolve", reference);
            return Ok(reference.to_string());
        }
        Err(Error::NotFound(format!(
            "router '{reference}' of agent '{name}' is not registered"
        )))
    };

    let mut translated = config.clone();
    translated.upstream_routers = config
        .upstream_routers
        .iter()
        .map(|r| translate(r))
        .collect::<Result<_>>()?;
    translated.network_router = config
        .network_router
        .as_deref()
        .map(translate)
        .transpose()?;
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, uuid: &str) -> AgentInfo {
        AgentInfo {
            name: name.to_string(),
            uuid: uuid.to_string(),
            router_mode: None,
            upstream_routers: vec![],
            network_router: None,
            host: None,
        }
    }

    #[test]
    fn test_router_names_become_uuids() {
        let config = AgentConfiguration {
            upstream_routers: vec!["r1".to_string(), DEFAULT_ROUTER_NAME.to_string()],
            network_router: Some("r1".to_string()),
            host: Some("10.0.0.12".to_string()),
            ..Default::default()
        };
        let translated =
            with_controller_refs(&config, &[agent("r1", "uuid-1")], "r2").unwrap();
        assert_eq!(translated.upstream_routers, vec!["uuid-1", DEFAULT_ROUTER_NAME]);
        assert_eq!(translated.network_router.as_deref(), Some("uuid-1"));
    }

    #[test]
    fn test_unknown_router_is_not_found() {
        let config = AgentConfiguration {
            upstream_routers: vec!["ghost".to_string()],
            ..Default::default()
        };
        let err = with_controller_refs(&config, &[], "r2").unwrap_err();
        assert!(err.is_not_found());
    }
}
