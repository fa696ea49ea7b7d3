//! # Fleet Deploy
//!
//! Deployment orchestration engine for edgefleet manifests.
//!
//! A manifest is decoded into one [`Executor`] per document through a
//! [`KindRegistry`]. The [`Orchestrator`] then drives the executors through
//! a fixed sequence of stages:
//!
//! 1. control plane
//! 2. controllers
//! 3. agent configurations, ordered by their router dependencies
//! 4. the remaining kinds in priority order
//!
//! Executors within a stage run concurrently and every failure is collected.
//! A failed stage stops the deployment; earlier stages are not rolled back.
//!
//! ## Example
//!
//! ```no_run
//! use fleet_deploy::{DeployContext, Orchestrator};
//! use fleet_store::NamespaceStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> fleet_deploy::Result<()> {
//! let store = Arc::new(NamespaceStore::open("/var/lib/edgefleet/store").await?);
//! let orchestrator = Orchestrator::new(DeployContext::with_defaults(store));
//!
//! orchestrator.deploy("fleet.yaml", "default").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

use fleet_store::ErrorKind;

pub mod cache;
pub mod client;
pub mod context;
pub mod executor;
pub mod executors;
pub mod install;
pub mod kinds;
pub mod orchestrator;
pub mod resolver;
pub mod runner;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{ClientCache, ClientFactory};
pub use client::{AgentInfo, AgentRegistration, ControllerClient, HttpClientFactory, HttpControllerClient};
pub use context::DeployContext;
pub use executor::{AgentConfigDecl, EmptyExecutor, Executor};
pub use install::{CommandInstaller, Installer, Installers};
pub use kinds::{Constructor, ExecutorBuckets, ExecutorSpec, KindRegistry};
pub use orchestrator::{DELETE_ORDER, DEPLOY_PRIORITY, Orchestrator, default_agent_config};
pub use resolver::{DependencyGraph, PartitionExecutor, partition_by_namespace};
pub use runner::{Failure, RunReport, run_all, run_stage};

/// Error types for deployment operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Namespace store errors
    #[error(transparent)]
    Store(#[from] fleet_store::Error),

    /// Manifest decoding errors
    #[error(transparent)]
    Manifest(#[from] fleet_manifest::ManifestError),

    /// Malformed or contradictory input
    #[error("invalid input: {0}")]
    Input(String),

    /// Referenced resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// The controller or backend lacks a capability
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Invariant violated by the program itself
    #[error("internal error: {0}")]
    Internal(String),

    /// Agents whose router references form a cycle
    #[error("router dependency cycle between agents: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// Coalesced failures of one stage
    #[error("{}", stage_message(.stage, .failures))]
    Stage {
        /// Stage name
        stage: String,
        /// Every failed executor of the stage
        failures: Vec<Failure>,
    },
}

fn stage_message(stage: &str, failures: &[Failure]) -> String {
    let mut message = format!("stage '{stage}' failed ({} error(s))", failures.len());
    for failure in failures {
        message.push_str("\n  ");
        message.push_str(&failure.to_string());
    }
    message
}

impl Error {
    /// Classify this error.
    ///
    /// A stage error takes the kind of its first failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Store(e) => e.kind(),
            Error::Manifest(e) => e.kind(),
            Error::Input(_) | Error::DependencyCycle(_) => ErrorKind::Input,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Stage { failures, .. } => failures
                .first()
                .map(|f| f.error.kind())
                .unwrap_or(ErrorKind::Internal),
        }
    }

    /// Whether the error only says the target is already absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Stage { failures, .. } => {
                !failures.is_empty() && failures.iter().all(|f| f.error.is_not_found())
            }
            other => other.kind() == ErrorKind::NotFound,
        }
    }
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_lists_every_failure() {
        let err = Error::Stage {
            stage: "agents".to_string(),
            failures: vec![
                Failure::new("RemoteAgent r1", Error::NotFound("agent 'r1'".to_string())),
                Failure::new("RemoteAgent r2", Error::Internal("ssh exited with 255".to_string())),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("stage 'agents' failed (2 error(s))"));
        assert!(msg.contains("RemoteAgent r1: not found: agent 'r1'"));
        assert!(msg.contains("RemoteAgent r2: internal error: ssh exited with 255"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_store_errors_keep_their_kind() {
        let err: Error = fleet_store::Error::NamespaceNotFound("edge".to_string()).into();
        assert!(err.is_not_found());

        let err: Error = fleet_store::Error::Conflict("variant".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_cycle_error_names_agents() {
        let err = Error::DependencyCycle(vec!["A".into(), "B".into(), "C".into()]);
        assert_eq!(err.to_string(), "router dependency cycle between agents: A, B, C");
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}
