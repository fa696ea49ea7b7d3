//! Namespace store backend implementations

pub mod memory;
pub mod sled;

use crate::{error::Result, models::Namespace};
use async_trait::async_trait;

/// Trait for namespace storage backends
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Initialize the backend
    async fn init(&self) -> Result<()>;

    /// Store a namespace, replacing any previous version
    async fn put_namespace(&self, namespace: &Namespace) -> Result<()>;

    /// Get a namespace by name
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    /// List all namespaces
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    /// Remove a namespace
    async fn remove_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    /// Persist pending writes to durable storage
    async fn flush(&self) -> Result<()>;
}
