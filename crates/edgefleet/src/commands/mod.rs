use anyhow::{Context, Result};
use fleet_deploy::{DeployContext, Orchestrator};
use fleet_store::NamespaceStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod delete;
pub mod deploy;
pub mod get;
pub mod namespace;

const DEFAULT_NAMESPACE: &str = "default";

/// `--home`, falling back to the platform data directory
pub fn home_dir(home: Option<PathBuf>) -> Result<PathBuf> {
    match home {
        Some(home) => Ok(home),
        None => Ok(dirs::data_local_dir()
            .context("Could not determine the local data directory, pass --home")?
            .join("edgefleet")),
    }
}

/// Open the store under `home`, creating the default namespace on first use
pub async fn open_store(home: &Path) -> Result<Arc<NamespaceStore>> {
    let path = home.join("store");
    let store = NamespaceStore::open(&path)
        .await
        .with_context(|| format!("Failed to open the store at {}", path.display()))?;
    store.ensure_namespace(DEFAULT_NAMESPACE).await?;
    Ok(Arc::new(store))
}

/// Orchestrator over the store under `home`
pub async fn orchestrator(home: &Path) -> Result<Orchestrator> {
    let store = open_store(home).await?;
    Ok(Orchestrator::new(DeployContext::with_defaults(store)))
}
