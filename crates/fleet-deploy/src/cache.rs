//! Explicit cache of controller clients and agent snapshots per namespace

use crate::client::{AgentInfo, ControllerClient};
use crate::Result;
use async_trait::async_trait;
use fleet_store::{ControlPlane, NamespaceStore};
use futures::lock::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a controller client for a namespace
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Connect to the controller of `control_plane`
    async fn connect(
        &self,
        namespace: &str,
        control_plane: &ControlPlane,
    ) -> Result<Arc<dyn ControllerClient>>;
}

/// Memoizes one controller client and one agent snapshot per namespace.
///
/// Executors that change a control plane endpoint call [`invalidate`];
/// executors that register or remove agents call [`invalidate_agents`].
///
/// [`invalidate`]: ClientCache::invalidate
/// [`invalidate_agents`]: ClientCache::invalidate_agents
pub struct ClientCache {
    store: Arc<NamespaceStore>,
    factory: Arc<dyn ClientFactory>,
    clients: Mutex<HashMap<String, Arc<dyn ControllerClient>>>,
    agents: Mutex<HashMap<String, Arc<Vec<AgentInfo>>>>,
}

impl ClientCache {
    /// Create an empty cache
    pub fn new(store: Arc<NamespaceStore>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            store,
            factory,
            clients: Mutex::new(HashMap::new()),
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Client for the controller of `namespace`
    pub async fn client(&self, namespace: &str) -> Result<Arc<dyn ControllerClient>> {
        // Held across the connect so concurrent callers share one login
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(namespace) {
            return Ok(client.clone());
        }
        let control_plane = self.store.get_control_plane(namespace).await?;
        debug!("Connecting to the controller of namespace '{}'", namespace);
        let client = self.factory.connect(namespace, &control_plane).await?;
        clients.insert(namespace.to_string(), client.clone());
        Ok(client)
    }

    /// Agents registered on the controller of `namespace`
    pub async fn agents(&self, namespace: &str) -> Result<Arc<Vec<AgentInfo>>> {
        if let Some(agents) = self.agents.lock().await.get(namespace) {
            return Ok(agents.clone());
        }
        let client = self.client(namespace).await?;
        let agents = Arc::new(client.list_agents().await?);
        debug!(
            "Cached {} agent(s) of namespace '{}'",
            agents.len(),
            namespace
        );
        self.agents
            .lock()
            .await
            .insert(namespace.to_string(), agents.clone());
        Ok(agents)
    }

    /// Drop the client and the agent snapshot of `namespace`
    pub async fn invalidate(&self, namespace: &str) {
        self.clients.lock().await.remove(namespace);
        self.invalidate_agents(namespace).await;
    }

    /// Drop only the agent snapshot of `namespace`
    pub async fn invalidate_agents(&self, namespace: &str) {
        self.agents.lock().await.remove(namespace);
    }
}
