//! The unit of work produced from one manifest document

use crate::Result;
use async_trait::async_trait;
use fleet_store::{Agent, AgentConfiguration};

/// Router configuration an executor applies to one agent
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfigDecl {
    /// Namespace of the agent
    pub namespace: String,
    /// Agent name
    pub name: String,
    /// Configuration to apply
    pub config: AgentConfiguration,
}

impl AgentConfigDecl {
    /// Names of the agents that must be configured first
    pub fn dependencies(&self) -> Vec<String> {
        self.config.dependencies()
    }
}

/// A runnable unit of work.
///
/// Executors are built per deployment from manifest documents and are
/// dropped once the stage that owns them finishes.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Display name used in logs and error reports, e.g. `RemoteAgent r1`
    fn name(&self) -> &str;

    /// Perform the work
    async fn execute(&self) -> Result<()>;

    /// Router configuration this executor applies, if it configures an agent
    fn agent_config(&self) -> Option<&AgentConfigDecl> {
        None
    }

    /// Agent this executor deploys, if any
    fn agent(&self) -> Option<&Agent> {
        None
    }
}

/// Executor that does nothing.
///
/// Stands in for agents that already exist on the controller and are only
/// referenced as router dependencies.
#[derive(Debug, Clone)]
pub struct EmptyExecutor {
    name: String,
}

impl EmptyExecutor {
    /// Create a placeholder for the named resource
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Executor for EmptyExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        Ok(())
    }
}
