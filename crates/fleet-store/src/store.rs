//! Namespace store shared by every executor of a deployment run

use crate::{
    backend::{StoreBackend, memory::MemoryBackend, sled::SledBackend},
    error::{Error, Result},
    models::*,
};
use futures::lock::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Process-wide store of namespaces.
///
/// A single mutex serializes every read and mutation, so concurrently running
/// executors can share one store. Mutations are applied to a copy and only
/// committed (to the cache and the backend) when they succeed.
pub struct NamespaceStore {
    backend: Arc<dyn StoreBackend>,
    namespaces: Mutex<HashMap<String, Namespace>>,
}

impl NamespaceStore {
    /// Create a store over a custom backend
    pub fn with_backend(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            namespaces: Mutex::new(HashMap::new()),
        }
    }

    /// Open a persistent store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let backend = SledBackend::open(path)?;
        backend.init().await?;
        Ok(Self::with_backend(backend))
    }

    /// Create a store that lives only in memory
    pub fn in_memory() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    async fn load(
        &self,
        cache: &mut HashMap<String, Namespace>,
        name: &str,
    ) -> Result<Namespace> {
        if let Some(ns) = cache.get(name) {
            return Ok(ns.clone());
        }
        let ns = self
            .backend
            .get_namespace(name)
            .await?
            .ok_or_else(|| Error::NamespaceNotFound(name.to_string()))?;
        cache.insert(name.to_string(), ns.clone());
        Ok(ns)
    }

    async fn mutate<T>(
        &self,
        namespace: &str,
        f: impl FnOnce(&mut Namespace) -> Result<T> + Send,
    ) -> Result<T>
    where
        T: Send,
    {
        let mut cache = self.namespaces.lock().await;
        let mut ns = self.load(&mut cache, namespace).await?;
        let out = f(&mut ns)?;
        self.backend.put_namespace(&ns).await?;
        cache.insert(namespace.to_string(), ns);
        Ok(out)
    }

    async fn read<T>(
        &self,
        namespace: &str,
        f: impl FnOnce(&Namespace) -> Result<T> + Send,
    ) -> Result<T>
    where
        T: Send,
    {
        let mut cache = self.namespaces.lock().await;
        let ns = self.load(&mut cache, namespace).await?;
        f(&ns)
    }

    /// Create a new, empty namespace
    pub async fn create_namespace(&self, name: &str) -> Result<Namespace> {
        let mut cache = self.namespaces.lock().await;
        if cache.contains_key(name) || self.backend.get_namespace(name).await?.is_some() {
            return Err(Error::Conflict(format!("namespace '{name}' already exists")));
        }
        let ns = Namespace::new(name);
        self.backend.put_namespace(&ns).await?;
        cache.insert(name.to_string(), ns.clone());
        info!("Created namespace {}", name);
        Ok(ns)
    }

    /// Create the namespace unless it already exists
    pub async fn ensure_namespace(&self, name: &str) -> Result<Namespace> {
        match self.get_namespace(name).await {
            Ok(ns) => Ok(ns),
            Err(Error::NamespaceNotFound(_)) => match self.create_namespace(name).await {
                Err(Error::Conflict(_)) => self.get_namespace(name).await,
                other => other,
            },
            Err(e) => Err(e),
        }
    }

    /// Get a snapshot of a namespace
    pub async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.read(name, |ns| Ok(ns.clone())).await
    }

    /// List all namespaces
    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let cache = self.namespaces.lock().await;
        let mut namespaces = self.backend.list_namespaces().await?;
        for ns in &mut namespaces {
            if let Some(cached) = cache.get(&ns.name) {
                *ns = cached.clone();
            }
        }
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(namespaces)
    }

    /// Delete a namespace.
    ///
    /// Without `force` the namespace must have no agents and no control plane.
    pub async fn delete_namespace(&self, name: &str, force: bool) -> Result<Namespace> {
        let mut cache = self.namespaces.lock().await;
        let ns = self.load(&mut cache, name).await?;
        if !force && !ns.is_empty() {
            return Err(Error::Conflict(format!(
                "namespace '{name}' still has {} agent(s){}",
                ns.agents.len(),
                if ns.control_plane.is_some() { " and a control plane" } else { "" }
            )));
        }
        self.backend.remove_namespace(name).await?;
        cache.remove(name);
        info!("Deleted namespace {}", name);
        Ok(ns)
    }

    /// Get the control plane of a namespace
    pub async fn get_control_plane(&self, namespace: &str) -> Result<ControlPlane> {
        self.read(namespace, |ns| {
            ns.control_plane.clone().ok_or_else(|| Error::NotFound {
                kind: "control plane",
                namespace: namespace.to_string(),
                name: String::new(),
            })
        })
        .await
    }

    /// Set the control plane.
    ///
    /// Replacing a control plane with one of a different backend is a conflict;
    /// the existing one must be deleted first.
    pub async fn set_control_plane(&self, namespace: &str, control_plane: ControlPlane) -> Result<()> {
        self.mutate(namespace, |ns| {
            if let Some(existing) = &ns.control_plane {
                if existing.backend() != control_plane.backend() {
                    return Err(Error::Conflict(format!(
                        "namespace '{}' already has a {} control plane; delete it before deploying a {} one",
                        ns.name,
                        existing.backend(),
                        control_plane.backend()
                    )));
                }
            }
            debug!("Setting {} control plane in {}", control_plane.backend(), ns.name);
            ns.control_plane = Some(control_plane);
            Ok(())
        })
        .await
    }

    /// Remove the control plane of a namespace
    pub async fn delete_control_plane(&self, namespace: &str) -> Result<ControlPlane> {
        self.mutate(namespace, |ns| {
            ns.control_plane.take().ok_or_else(|| Error::NotFound {
                kind: "control plane",
                namespace: ns.name.clone(),
                name: String::new(),
            })
        })
        .await
    }

    /// Add a controller to the existing control plane
    pub async fn add_controller(&self, namespace: &str, controller: Controller) -> Result<()> {
        self.mutate(namespace, |ns| {
            let name = ns.name.clone();
            let cp = ns.control_plane.as_mut().ok_or_else(|| Error::NotFound {
                kind: "control plane",
                namespace: name.clone(),
                name: String::new(),
            })?;
            if cp.controller(controller.name()).is_some() {
                return Err(Error::AlreadyExists {
                    kind: "controller",
                    namespace: name,
                    name: controller.name().to_string(),
                });
            }
            cp.upsert_controller(controller)
        })
        .await
    }

    /// Insert or replace a controller of the existing control plane
    pub async fn update_controller(&self, namespace: &str, controller: Controller) -> Result<()> {
        self.mutate(namespace, |ns| {
            let name = ns.name.clone();
            ns.control_plane
                .as_mut()
                .ok_or_else(|| Error::NotFound {
                    kind: "control plane",
                    namespace: name,
                    name: String::new(),
                })?
                .upsert_controller(controller)
        })
        .await
    }

    /// Remove a controller from the control plane
    pub async fn delete_controller(&self, namespace: &str, name: &str) -> Result<Controller> {
        self.mutate(namespace, |ns| {
            let removed = ns
                .control_plane
                .as_mut()
                .and_then(|cp| cp.remove_controller(name));
            removed.ok_or_else(|| Error::NotFound {
                kind: "controller",
                namespace: ns.name.clone(),
                name: name.to_string(),
            })
        })
        .await
    }

    /// Get an agent by name
    pub async fn get_agent(&self, namespace: &str, name: &str) -> Result<Agent> {
        self.read(namespace, |ns| {
            ns.agent(name).cloned().ok_or_else(|| Error::NotFound {
                kind: "agent",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        })
        .await
    }

    /// List the agents of a namespace
    pub async fn list_agents(&self, namespace: &str) -> Result<Vec<Agent>> {
        self.read(namespace, |ns| Ok(ns.agents.clone())).await
    }

    /// Add a new agent; the name must be unused
    pub async fn add_agent(&self, namespace: &str, agent: Agent) -> Result<()> {
        self.mutate(namespace, |ns| {
            if ns.agent(agent.name()).is_some() {
                return Err(Error::AlreadyExists {
                    kind: "agent",
                    namespace: ns.name.clone(),
                    name: agent.name().to_string(),
                });
            }
            ns.agents.push(agent);
            Ok(())
        })
        .await
    }

    /// Insert or replace an agent
    pub async fn update_agent(&self, namespace: &str, agent: Agent) -> Result<()> {
        self.mutate(namespace, |ns| {
            match ns.agents.iter_mut().find(|a| a.name() == agent.name()) {
                Some(existing) => *existing = agent,
                None => ns.agents.push(agent),
            }
            Ok(())
        })
        .await
    }

    /// Remove an agent
    pub async fn delete_agent(&self, namespace: &str, name: &str) -> Result<Agent> {
        self.mutate(namespace, |ns| {
            let idx = ns
                .agents
                .iter()
                .position(|a| a.name() == name)
                .ok_or_else(|| Error::NotFound {
                    kind: "agent",
                    namespace: ns.name.clone(),
                    name: name.to_string(),
                })?;
            Ok(ns.agents.remove(idx))
        })
        .await
    }

    /// Insert or replace a volume
    pub async fn add_volume(&self, namespace: &str, volume: Volume) -> Result<()> {
        self.mutate(namespace, |ns| {
            match ns.volumes.iter_mut().find(|v| v.name == volume.name) {
                Some(existing) => *existing = volume,
                None => ns.volumes.push(volume),
            }
            Ok(())
        })
        .await
    }

    /// Remove a volume
    pub async fn delete_volume(&self, namespace: &str, name: &str) -> Result<Volume> {
        self.mutate(namespace, |ns| {
            let idx = ns
                .volumes
                .iter()
                .position(|v| v.name == name)
                .ok_or_else(|| Error::NotFound {
                    kind: "volume",
                    namespace: ns.name.clone(),
                    name: name.to_string(),
                })?;
            Ok(ns.volumes.remove(idx))
        })
        .await
    }

    /// Persist every committed change to durable storage
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.namespaces.lock().await;
        self.backend.flush().await
    }
}
