//! Deployment context
//!
//! Carries the collaborators every executor needs: the namespace store, the
//! controller client cache and the installers.

use crate::cache::{ClientCache, ClientFactory};
use crate::client::HttpClientFactory;
use crate::install::Installers;
use fleet_store::NamespaceStore;
use std::sync::Arc;

/// Context shared by the orchestrator and its executors
#[derive(Clone)]
pub struct DeployContext {
    /// Namespace store
    pub store: Arc<NamespaceStore>,

    /// Controller clients and agent snapshots
    pub cache: Arc<ClientCache>,

    /// Installers per backend
    pub installers: Arc<Installers>,
}

impl DeployContext {
    /// Create a context from explicit collaborators
    pub fn new(
        store: Arc<NamespaceStore>,
        factory: Arc<dyn ClientFactory>,
        installers: Installers,
    ) -> Self {
        let cache = Arc::new(ClientCache::new(store.clone(), factory));
        Self {
            store,
            cache,
            installers: Arc::new(installers),
        }
    }

    /// Context talking to real controllers over HTTP and installing with
    /// `docker`, `ssh` and `kubectl`
    pub fn with_defaults(store: Arc<NamespaceStore>) -> Self {
        Self::new(store, Arc::new(HttpClientFactory), Installers::commands())
    }
}
