//! Resource model and namespace store for edgefleet
//!
//! A namespace is an isolated deployment target: it owns at most one control
//! plane, a set of agents unique by name, and auxiliary resources such as
//! volumes. The [`NamespaceStore`] persists namespaces across CLI invocations
//! and serializes concurrent access from executors running in parallel.
//!
//! # Example
//!
//! ```no_run
//! use fleet_store::{Agent, LocalAgent, NamespaceStore};
//!
//! # async fn example() -> fleet_store::Result<()> {
//! let store = NamespaceStore::open("/tmp/edgefleet/store").await?;
//! store.ensure_namespace("default").await?;
//! store
//!     .add_agent(
//!         "default",
//!         Agent::Local(LocalAgent {
//!             name: "local-agent".to_string(),
//!             ..Default::default()
//!         }),
//!     )
//!     .await?;
//! store.flush().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod agent_config;
pub mod backend;
pub mod error;
pub mod models;
pub mod store;

pub use agent_config::{AgentConfiguration, DEFAULT_ROUTER_NAME, RouterMode};
pub use backend::{StoreBackend, memory::MemoryBackend, sled::SledBackend};
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use store::NamespaceStore;
