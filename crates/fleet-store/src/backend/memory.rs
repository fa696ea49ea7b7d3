//! In-memory backend for the namespace store

use super::StoreBackend;
use crate::{error::Result, models::Namespace};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory namespace backend
#[derive(Default)]
pub struct MemoryBackend {
    namespaces: RwLock<BTreeMap<String, Namespace>>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn put_namespace(&self, namespace: &Namespace) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap_or_else(|e| e.into_inner());
        namespaces.insert(namespace.name.clone(), namespace.clone());
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let namespaces = self.namespaces.read().unwrap_or_else(|e| e.into_inner());
        Ok(namespaces.get(name).cloned())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let namespaces = self.namespaces.read().unwrap_or_else(|e| e.into_inner());
        Ok(namespaces.values().cloned().collect())
    }

    async fn remove_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let mut namespaces = self.namespaces.write().unwrap_or_else(|e| e.into_inner());
        Ok(namespaces.remove(name))
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
