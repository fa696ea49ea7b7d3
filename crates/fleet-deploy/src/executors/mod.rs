//! Executors for every registered kind
//!
//! Deploy-oriented executors live next to the kind they deploy; the
//! delete-oriented ones are grouped in [`delete`].

use crate::kinds::ExecutorSpec;
use crate::{Error, Result};
use serde::de::DeserializeOwned;

pub mod agent;
pub mod agent_config;
pub mod control_plane;
pub mod controller;
pub mod delete;
pub mod resource;

pub use agent::AgentExecutor;
pub use agent_config::AgentConfigExecutor;
pub use control_plane::ControlPlaneExecutor;
pub use controller::ControllerExecutor;
pub use delete::DeleteExecutor;
pub use resource::{ApplyResourceExecutor, VolumeExecutor};

/// Decode the spec of a document
pub(crate) fn decode<T: DeserializeOwned>(spec: &ExecutorSpec) -> Result<T> {
    Ok(fleet_manifest::decode_spec(
        spec.kind.as_str(),
        &spec.name,
        &spec.spec,
    )?)
}

/// `<Kind> <name>` as shown in logs and failure reports
pub(crate) fn display_name(kind: impl std::fmt::Display, name: &str) -> String {
    format!("{kind} {name}")
}

pub(crate) fn unexpected_kind(spec: &ExecutorSpec) -> Error {
    Error::Internal(format!(
        "no constructor for {} '{}' in this group",
        spec.kind, spec.name
    ))
}
