//! Stage-driven deploy and delete orchestration
//!
//! Deploying walks the stages control plane, controllers, agent
//! configuration and then [`DEPLOY_PRIORITY`]. Deleting walks
//! [`DELETE_ORDER`]. A failed stage stops the walk and nothing that already
//! succeeded is rolled back.

use crate::executors::{AgentConfigExecutor, AgentExecutor};
use crate::kinds::{ExecutorBuckets, ExecutorSpec, KindRegistry};
use crate::resolver::{PartitionExecutor, partition_by_namespace};
use crate::runner::{RunReport, run_all, run_stage};
use crate::{DeployContext, Error, Executor, Result};
use fleet_manifest::{Header, Kind};
use fleet_store::{
    Agent, AgentConfiguration, Backend, DEFAULT_ROUTER_NAME, ErrorKind, Resource, RouterMode,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Stages run after agent configuration, in order
pub const DEPLOY_PRIORITY: &[(&str, &[Kind])] = &[
    ("edge resources", &[Kind::EdgeResource]),
    ("agents", &[Kind::RemoteAgent, Kind::LocalAgent]),
    ("volumes", &[Kind::Volume]),
    ("registries", &[Kind::Registry]),
    ("catalog items", &[Kind::CatalogItem]),
    ("application templates", &[Kind::ApplicationTemplate]),
    ("applications", &[Kind::Application]),
    ("microservices", &[Kind::Microservice]),
    ("routes", &[Kind::Route]),
];

/// Stages of a manifest deletion, in order
pub const DELETE_ORDER: &[(&str, &[Kind])] = &[
    ("routes", &[Kind::Route]),
    ("microservices", &[Kind::Microservice]),
    ("applications", &[Kind::Application]),
    ("application templates", &[Kind::ApplicationTemplate]),
    ("catalog items", &[Kind::CatalogItem]),
    ("registries", &[Kind::Registry]),
    ("volumes", &[Kind::Volume]),
    ("edge resources", &[Kind::EdgeResource]),
    ("agent configuration", &[Kind::AgentConfig]),
    ("agents", &[Kind::RemoteAgent, Kind::LocalAgent]),
    (
        "controllers",
        &[
            Kind::KubernetesController,
            Kind::RemoteController,
            Kind::LocalController,
        ],
    ),
    (
        "control plane",
        &[
            Kind::KubernetesControlPlane,
            Kind::RemoteControlPlane,
            Kind::LocalControlPlane,
        ],
    ),
];

const CONTROL_PLANE_KINDS: &[Kind] = &[
    Kind::KubernetesControlPlane,
    Kind::RemoteControlPlane,
    Kind::LocalControlPlane,
];

const CONTROLLER_KINDS: &[Kind] = &[
    Kind::KubernetesController,
    Kind::RemoteController,
    Kind::LocalController,
];

fn take(buckets: &mut ExecutorBuckets, kinds: &[Kind]) -> Vec<Arc<dyn Executor>> {
    kinds
        .iter()
        .filter_map(|kind| buckets.remove(kind))
        .flatten()
        .collect()
}

/// Router configuration given to agents that declare none
pub fn default_agent_config(agent: &Agent) -> AgentConfiguration {
    match agent {
        Agent::Local(_) => AgentConfiguration {
            router_mode: Some(RouterMode::Interior),
            host: Some(agent.host().to_string()),
            ..Default::default()
        },
        Agent::Remote(a) => AgentConfiguration {
            router_mode: Some(RouterMode::Edge),
            upstream_routers: vec![DEFAULT_ROUTER_NAME.to_string()],
            host: Some(a.host.clone()),
            ..Default::default()
        },
    }
}

/// Top-level driver of deployments and deletions
pub struct Orchestrator {
    ctx: DeployContext,
    deploy_kinds: KindRegistry,
    delete_kinds: KindRegistry,
}

impl Orchestrator {
    /// Orchestrator with the default constructors for every kind
    pub fn new(ctx: DeployContext) -> Self {
        let deploy_kinds = KindRegistry::deploy_defaults(&ctx);
        let delete_kinds = KindRegistry::delete_defaults(&ctx);
        Self::with_registries(ctx, deploy_kinds, delete_kinds)
    }

    /// Orchestrator with custom constructors
    pub fn with_registries(
        ctx: DeployContext,
        deploy_kinds: KindRegistry,
        delete_kinds: KindRegistry,
    ) -> Self {
        Self {
            ctx,
            deploy_kinds,
            delete_kinds,
        }
    }

    /// Shared context
    pub fn context(&self) -> &DeployContext {
        &self.ctx
    }

    /// Deploy the manifest at `path` into `namespace`
    pub async fn deploy(&self, path: impl AsRef<Path>, namespace: &str) -> Result<()> {
        let headers = fleet_manifest::parse_file(path)?;
        self.deploy_manifest(&headers, namespace).await
    }

    /// Deploy decoded manifest documents into `namespace`
    pub async fn deploy_manifest(&self, headers: &[Header], namespace: &str) -> Result<()> {
        self.ctx.store.get_namespace(namespace).await?;

        let mut buckets = self.deploy_kinds.dispatch(headers, namespace)?;

        let control_planes = take(&mut buckets, CONTROL_PLANE_KINDS);
        if control_planes.len() > 1 {
            let names: Vec<&str> = control_planes.iter().map(|e| e.name()).collect();
            return Err(Error::Input(format!(
                "a namespace has exactly one control plane, the manifest declares {}",
                names.join(", ")
            )));
        }
        self.backfill(&mut buckets, namespace).await?;

        info!("Deploying to namespace '{}'", namespace);
        run_stage("control plane", control_planes).await?;
        run_stage("controllers", take(&mut buckets, CONTROLLER_KINDS)).await?;
        self.configure_agents(take(&mut buckets, &[Kind::AgentConfig]))
            .await?;
        for (stage, kinds) in DEPLOY_PRIORITY {
            run_stage(stage, take(&mut buckets, kinds)).await?;
        }

        info!("Deployment to namespace '{}' complete", namespace);
        Ok(())
    }

    /// Give every declared agent exactly one complete agent configuration.
    ///
    /// An explicit `AgentConfig` document wins over a configuration inline
    /// in the agent, which wins over [`default_agent_config`]. Explicit
    /// documents without a host take the host of the agent declared next to
    /// them, or of the agent already in the store. Agents are rebuilt to
    /// carry the configuration they end up with.
    async fn backfill(&self, buckets: &mut ExecutorBuckets, namespace: &str) -> Result<()> {
        let declared: HashMap<String, String> = [Kind::RemoteAgent, Kind::LocalAgent]
            .iter()
            .filter_map(|kind| buckets.get(kind))
            .flatten()
            .filter_map(|e| e.agent())
            .map(|agent| (agent.name().to_string(), agent.host().to_string()))
            .collect();

        let mut explicit: HashMap<String, AgentConfiguration> = HashMap::new();
        if let Some(configs) = buckets.get_mut(&Kind::AgentConfig) {
            for executor in configs.iter_mut() {
                let Some(decl) = executor.agent_config().cloned() else {
                    continue;
                };
                let mut config = decl.config;
                if config.host.is_none() && config.mode() != RouterMode::None {
                    config.host = match declared.get(&decl.name) {
                        Some(host) => Some(host.clone()),
                        None => self.stored_host(namespace, &decl.name).await?,
                    };
                    if config.host.is_some() {
                        *executor = Arc::new(AgentConfigExecutor::new(
                            self.ctx.clone(),
                            namespace,
                            &decl.name,
                            config.clone(),
                        ));
                    }
                }
                config.validate(&decl.name)?;
                explicit.insert(decl.name, config);
            }
        }

        let mut synthesized: Vec<Arc<dyn Executor>> = Vec::new();
        for kind in [Kind::RemoteAgent, Kind::LocalAgent] {
            let Some(agents) = buckets.get_mut(&kind) else {
                continue;
            };
            for executor in agents.iter_mut() {
                let Some(mut agent) = executor.agent().cloned() else {
                    continue;
                };
                let config = match explicit.get(agent.name()) {
                    Some(config) => config.clone(),
                    None => {
                        let config = agent
                            .config()
                            .cloned()
                            .unwrap_or_else(|| default_agent_config(&agent));
                        synthesized.push(Arc::new(AgentConfigExecutor::new(
                            self.ctx.clone(),
                            namespace,
                            agent.name(),
                            config.clone(),
                        )));
                        config
                    }
                };
                if agent.config() != Some(&config) {
                    agent.set_config(config);
                    *executor = Arc::new(AgentExecutor::new(self.ctx.clone(), namespace, agent));
                }
            }
        }

        if !synthesized.is_empty() {
            info!("Added {} default agent configuration(s)", synthesized.len());
            buckets
                .entry(Kind::AgentConfig)
                .or_default()
                .extend(synthesized);
        }
        Ok(())
    }

    /// Host of an agent deployed by an earlier manifest
    async fn stored_host(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        match self.ctx.store.get_agent(namespace, name).await {
            Ok(agent) => Ok(Some(agent.host().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn configure_agents(&self, executors: Vec<Arc<dyn Executor>>) -> Result<()> {
        let partitions: Vec<Arc<dyn Executor>> = partition_by_namespace(executors)?
            .into_iter()
            .map(|(namespace, executors)| {
                Arc::new(PartitionExecutor::new(
                    &namespace,
                    executors,
                    self.ctx.cache.clone(),
                )) as Arc<dyn Executor>
            })
            .collect();
        run_stage("agent configuration", partitions).await
    }

    /// Delete every resource declared in the manifest at `path`
    pub async fn delete(&self, path: impl AsRef<Path>, namespace: &str) -> Result<()> {
        let headers = fleet_manifest::parse_file(path)?;
        self.delete_manifest(&headers, namespace).await
    }

    /// Delete every resource declared in decoded manifest documents
    pub async fn delete_manifest(&self, headers: &[Header], namespace: &str) -> Result<()> {
        self.ctx.store.get_namespace(namespace).await?;
        let buckets = self.delete_kinds.dispatch(headers, namespace)?;
        info!("Deleting from namespace '{}'", namespace);
        self.delete_walk(buckets).await?;
        info!("Deletion from namespace '{}' complete", namespace);
        Ok(())
    }

    /// Walk [`DELETE_ORDER`]; resources already gone are only warned about
    async fn delete_walk(&self, mut buckets: ExecutorBuckets) -> Result<()> {
        for (stage, kinds) in DELETE_ORDER {
            let executors = take(&mut buckets, kinds);
            if executors.is_empty() {
                continue;
            }
            let report = run_all(executors).await;
            let mut failures = Vec::new();
            for failure in report.failures {
                if failure.error.is_not_found() {
                    warn!("{} is already gone: {}", failure.executor, failure.error);
                } else {
                    failures.push(failure);
                }
            }
            RunReport {
                succeeded: report.succeeded,
                failures,
            }
            .into_result(stage)?;
        }
        Ok(())
    }

    /// Delete a namespace.
    ///
    /// Without `force` the namespace must be empty. With `force` its agents
    /// and control plane are removed first.
    pub async fn delete_namespace(&self, name: &str, force: bool) -> Result<()> {
        if force {
            let namespace = self.ctx.store.get_namespace(name).await?;
            let mut specs: Vec<ExecutorSpec> = namespace
                .agents
                .iter()
                .map(|agent| {
                    let kind = match agent.backend() {
                        Backend::Local => Kind::LocalAgent,
                        _ => Kind::RemoteAgent,
                    };
                    self.spec_for(kind, name, agent.name())
                })
                .collect();
            if let Some(control_plane) = &namespace.control_plane {
                let kind = match control_plane.backend() {
                    Backend::Kubernetes => Kind::KubernetesControlPlane,
                    Backend::Remote => Kind::RemoteControlPlane,
                    Backend::Local => Kind::LocalControlPlane,
                };
                specs.push(self.spec_for(kind, name, control_plane.name()));
            }

            let mut buckets = ExecutorBuckets::new();
            for spec in specs {
                let kind = spec.kind;
                if let Some(executor) = self.delete_kinds.construct(spec)? {
                    buckets.entry(kind).or_default().push(executor);
                }
            }
            self.delete_walk(buckets).await?;
        }

        self.ctx.store.delete_namespace(name, force).await?;
        self.ctx.cache.invalidate(name).await;
        info!("Deleted namespace '{}'", name);
        Ok(())
    }

    fn spec_for(&self, kind: Kind, namespace: &str, name: &str) -> ExecutorSpec {
        ExecutorSpec {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            spec: serde_yaml::Value::Null,
            tags: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_store::{LocalAgent, RemoteAgent, SshConfig};

    #[test]
    fn test_default_configs_per_backend() {
        let local = Agent::Local(LocalAgent {
            name: "local".to_string(),
            ..Default::default()
        });
        let config = default_agent_config(&local);
        assert_eq!(config.mode(), RouterMode::Interior);
        assert_eq!(config.host.as_deref(), Some("localhost"));
        assert!(config.dependencies().is_empty());
        config.validate("local").unwrap();

        let remote = Agent::Remote(RemoteAgent {
            name: "r1".to_string(),
            host: "10.0.0.11".to_string(),
            ssh: SshConfig {
                user: "deploy".to_string(),
                key_file: "/keys/id".to_string(),
                port: 22,
            },
            uuid: None,
            package: None,
            config: None,
        });
        let config = default_agent_config(&remote);
        assert_eq!(config.mode(), RouterMode::Edge);
        assert_eq!(config.dependencies(), vec![DEFAULT_ROUTER_NAME.to_string()]);
        config.validate("r1").unwrap();
    }

    #[test]
    fn test_delete_order_reverses_deploy_priority() {
        let deploy: Vec<&str> = DEPLOY_PRIORITY.iter().map(|(s, _)| *s).collect();
        let delete: Vec<&str> = DELETE_ORDER
            .iter()
            .map(|(s, _)| *s)
            .filter(|s| deploy.contains(s))
            .collect();
        let mut reversed = deploy.clone();
        reversed.reverse();
        // Agents are deleted after their dependents but before the control plane
        let without_agents = |v: &[&str]| -> Vec<String> {
            v.iter().filter(|s| **s != "agents").map(|s| s.to_string()).collect()
        };
        assert_eq!(without_agents(&delete), without_agents(&reversed));
    }
}
