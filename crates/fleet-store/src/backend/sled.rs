//! Sled database backend for the namespace store

use super::StoreBackend;
use crate::{error::Result, models::Namespace};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

/// Sled-based namespace backend
pub struct SledBackend {
    /// Database instance
    db: sled::Db,
    /// Namespaces tree
    namespaces: sled::Tree,
}

impl SledBackend {
    /// Open (or create) a sled database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening namespace store at {:?}", path);
        let db = sled::open(path)?;
        let namespaces = db.open_tree("namespaces")?;

        Ok(Self { db, namespaces })
    }

    /// Create a temporary sled backend (for testing)
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let namespaces = db.open_tree("namespaces")?;
        Ok(Self { db, namespaces })
    }
}

#[async_trait]
impl StoreBackend for SledBackend {
    async fn init(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    async fn put_namespace(&self, namespace: &Namespace) -> Result<()> {
        debug!("Storing namespace: {}", namespace.name);
        let value = serde_json::to_vec(namespace)?;
        self.namespaces.insert(namespace.name.as_bytes(), value)?;
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        match self.namespaces.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let mut namespaces = Vec::new();
        for result in self.namespaces.iter() {
            let (_, value) = result?;
            namespaces.push(serde_json::from_slice(&value)?);
        }
        Ok(namespaces)
    }

    async fn remove_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        debug!("Removing namespace: {}", name);
        match self.namespaces.remove(name.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn flush(&self) -> Result<()> {
        self.namespaces.flush_async().await?;
        Ok(())
    }
}
