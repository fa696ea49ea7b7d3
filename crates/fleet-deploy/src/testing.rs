//! In-memory controller and installer doubles for tests
//!
//! Every double writes what it is asked to do into a shared [`EventLog`], so
//! tests can assert on the order of side effects across collaborators.

use crate::cache::ClientFactory;
use crate::client::{AgentInfo, AgentRegistration, ControllerClient};
use crate::install::{Installer, Installers};
use crate::{DeployContext, Error, Result};
use async_trait::async_trait;
use fleet_manifest::Kind;
use fleet_store::{Agent, ControlPlane, Controller, NamespaceStore, Resource};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered record of side effects
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn push(&self, event: impl Into<String>) {
        lock(&self.events).push(event.into());
    }

    /// Snapshot of every event so far
    pub fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }

    /// Index of the first event equal to `event`
    pub fn position(&self, event: &str) -> Option<usize> {
        lock(&self.events).iter().position(|e| e == event)
    }
}

/// Controller keeping agents and resources in memory
#[derive(Debug, Default)]
pub struct FakeControllerClient {
    log: EventLog,
    agents: Mutex<Vec<AgentInfo>>,
    resources: Mutex<BTreeMap<(Kind, String), Value>>,
}

impl FakeControllerClient {
    /// Create a controller without agents
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    /// Pre-register an agent
    pub fn with_agent(self, name: &str, uuid: &str) -> Self {
        lock(&self.agents).push(AgentInfo {
            name: name.to_string(),
            uuid: uuid.to_string(),
            router_mode: None,
            upstream_routers: Vec::new(),
            network_router: None,
            host: None,
        });
        self
    }

    /// Agents currently registered
    pub fn registered(&self) -> Vec<AgentInfo> {
        lock(&self.agents).clone()
    }

    /// Body last applied for a resource
    pub fn resource(&self, kind: Kind, name: &str) -> Option<Value> {
        lock(&self.resources).get(&(kind, name.to_string())).cloned()
    }

    fn info(registration: &AgentRegistration, uuid: String) -> AgentInfo {
        AgentInfo {
            name: registration.name.clone(),
            uuid,
            router_mode: registration.config.router_mode,
            upstream_routers: registration.config.upstream_routers.clone(),
            network_router: registration.config.network_router.clone(),
            host: registration.config.host.clone(),
        }
    }
}

fn missing_agent(reference: &str) -> Error {
    Error::NotFound(format!("agent '{reference}' is not registered"))
}

#[async_trait]
impl ControllerClient for FakeControllerClient {
    async fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        Ok(self.registered())
    }

    async fn get_agent_by_name(&self, name: &str) -> Result<AgentInfo> {
        lock(&self.agents)
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| missing_agent(name))
    }

    async fn create_agent(&self, agent: &AgentRegistration) -> Result<AgentInfo> {
        let mut agents = lock(&self.agents);
        if agents.iter().any(|a| a.name == agent.name) {
            return Err(Error::Conflict(format!("agent '{}' exists", agent.name)));
        }
        let info = Self::info(agent, uuid::Uuid::new_v4().to_string());
        agents.push(info.clone());
        self.log.push(format!("create agent {}", agent.name));
        Ok(info)
    }

    async fn update_agent(&self, uuid: &str, agent: &AgentRegistration) -> Result<AgentInfo> {
        let mut agents = lock(&self.agents);
        let slot = agents
            .iter_mut()
            .find(|a| a.uuid == uuid)
            .ok_or_else(|| missing_agent(uuid))?;
        *slot = Self::info(agent, uuid.to_string());
        self.log.push(format!("update agent {}", agent.name));
        Ok(slot.clone())
    }

    async fn delete_agent(&self, uuid: &str) -> Result<()> {
        let mut agents = lock(&self.agents);
        let index = agents
            .iter()
            .position(|a| a.uuid == uuid)
            .ok_or_else(|| missing_agent(uuid))?;
        let removed = agents.remove(index);
        self.log.push(format!("delete agent {}", removed.name));
        Ok(())
    }

    async fn provision_key(&self, uuid: &str) -> Result<String> {
        let name = lock(&self.agents)
            .iter()
            .find(|a| a.uuid == uuid)
            .map(|a| a.name.clone())
            .ok_or_else(|| missing_agent(uuid))?;
        self.log.push(format!("provision {name}"));
        Ok(format!("key-{name}"))
    }

    async fn apply_resource(&self, kind: Kind, name: &str, body: Value) -> Result<()> {
        lock(&self.resources).insert((kind, name.to_string()), body);
        self.log.push(format!("apply {kind} {name}"));
        Ok(())
    }

    async fn delete_resource(&self, kind: Kind, name: &str) -> Result<()> {
        lock(&self.resources)
            .remove(&(kind, name.to_string()))
            .ok_or_else(|| Error::NotFound(format!("{kind} '{name}' does not exist")))?;
        self.log.push(format!("delete {kind} {name}"));
        Ok(())
    }
}

/// Factory handing out one shared [`FakeControllerClient`]
pub struct FakeFactory {
    client: Arc<FakeControllerClient>,
    connections: AtomicUsize,
}

impl FakeFactory {
    /// Factory always connecting to `client`
    pub fn new(client: Arc<FakeControllerClient>) -> Self {
        Self {
            client,
            connections: AtomicUsize::new(0),
        }
    }

    /// Number of connections made so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn connect(
        &self,
        namespace: &str,
        control_plane: &ControlPlane,
    ) -> Result<Arc<dyn ControllerClient>> {
        if control_plane.endpoint().is_none() {
            return Err(Error::NotFound(format!(
                "control plane of namespace '{namespace}' has no endpoint"
            )));
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}

/// Installer that only records what it is asked to do
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    log: EventLog,
    failing: Mutex<HashSet<String>>,
}

impl RecordingInstaller {
    /// Create an installer writing to `log`
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    /// Make every operation on `name` fail
    pub fn fail_for(&self, name: &str) {
        lock(&self.failing).insert(name.to_string());
    }

    fn check(&self, name: &str) -> Result<()> {
        if lock(&self.failing).contains(name) {
            return Err(Error::Internal(format!("installation of '{name}' failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn install_controller(
        &self,
        namespace: &str,
        _control_plane: &ControlPlane,
        controller: &Controller,
    ) -> Result<String> {
        self.check(controller.name())?;
        self.log
            .push(format!("install controller {}", controller.name()));
        Ok(format!("http://{}.{namespace}:51121", controller.name()))
    }

    async fn uninstall_controller(
        &self,
        _namespace: &str,
        _control_plane: &ControlPlane,
        controller: &Controller,
    ) -> Result<()> {
        self.check(controller.name())?;
        self.log
            .push(format!("uninstall controller {}", controller.name()));
        Ok(())
    }

    async fn install_agent(
        &self,
        _namespace: &str,
        agent: &Agent,
        _controller_endpoint: &str,
        _provisioning_key: &str,
    ) -> Result<()> {
        self.check(agent.name())?;
        self.log.push(format!("install agent {}", agent.name()));
        Ok(())
    }

    async fn uninstall_agent(&self, _namespace: &str, agent: &Agent) -> Result<()> {
        self.check(agent.name())?;
        self.log.push(format!("uninstall agent {}", agent.name()));
        Ok(())
    }
}

/// A deploy context wired to in-memory doubles
pub struct TestHarness {
    /// Context handed to executors
    pub ctx: DeployContext,
    /// In-memory namespace store
    pub store: Arc<NamespaceStore>,
    /// Fake controller shared by every namespace
    pub controller: Arc<FakeControllerClient>,
    /// Installer used for every backend
    pub installer: Arc<RecordingInstaller>,
    /// Factory connecting to `controller`
    pub factory: Arc<FakeFactory>,
    /// Events of the controller and the installer
    pub log: EventLog,
}

impl TestHarness {
    /// Harness with an empty store
    pub fn new() -> Self {
        Self::with_controller(|controller| controller)
    }

    /// Harness whose controller is prepared by `prepare`
    pub fn with_controller(
        prepare: impl FnOnce(FakeControllerClient) -> FakeControllerClient,
    ) -> Self {
        let log = EventLog::new();
        let store = Arc::new(NamespaceStore::in_memory());
        let controller = Arc::new(prepare(FakeControllerClient::new(log.clone())));
        let installer = Arc::new(RecordingInstaller::new(log.clone()));
        let factory = Arc::new(FakeFactory::new(controller.clone()));
        let ctx = DeployContext::new(
            store.clone(),
            factory.clone(),
            Installers::uniform(installer.clone()),
        );
        Self {
            ctx,
            store,
            controller,
            installer,
            factory,
            log,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
