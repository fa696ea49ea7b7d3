//! Document envelope and resource kinds

use crate::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// apiVersions accepted in manifests
pub const SUPPORTED_API_VERSIONS: &[&str] = &["edgefleet.io/v3", "edgefleet.io/v2"];

/// Metadata block of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Resource name
    #[serde(default)]
    pub name: String,

    /// Target namespace; defaults to the invocation's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One document of a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// API group and version
    pub api_version: String,

    /// Declared resource kind, possibly unknown to this build
    pub kind: String,

    /// Resource metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Kind-specific body, decoded by the kind's constructor
    #[serde(default)]
    pub spec: serde_yaml::Value,
}

impl Header {
    /// Check the document may be deployed into `target`.
    ///
    /// A document without a namespace inherits the target.
    pub fn check_namespace(&self, target: &str) -> Result<()> {
        match &self.metadata.namespace {
            Some(declared) if !declared.is_empty() && declared != target => {
                Err(ManifestError::NamespaceMismatch {
                    kind: self.kind.clone(),
                    name: self.metadata.name.clone(),
                    declared: declared.clone(),
                    target: target.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Resolve the declared kind; `None` for kinds this build does not know
    pub fn resolved_kind(&self) -> Option<Kind> {
        self.kind.parse().ok()
    }
}

/// Resource kinds with a registered meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    /// Control plane deployed into Kubernetes
    KubernetesControlPlane,
    /// Control plane on remote hosts
    RemoteControlPlane,
    /// Control plane in a local container
    LocalControlPlane,
    /// Extra replica of a Kubernetes control plane
    KubernetesController,
    /// Extra remote controller
    RemoteController,
    /// Local controller
    LocalController,
    /// Agent on a remote host
    RemoteAgent,
    /// Agent in a local container
    LocalAgent,
    /// Router configuration of an agent
    AgentConfig,
    /// Volume mounted on agents
    Volume,
    /// Container registry
    Registry,
    /// Catalog item
    CatalogItem,
    /// Application
    Application,
    /// Application template
    ApplicationTemplate,
    /// Microservice
    Microservice,
    /// Route between microservices
    Route,
    /// Edge resource
    EdgeResource,
}

impl Kind {
    /// Every known kind
    pub const ALL: [Kind; 17] = [
        Kind::KubernetesControlPlane,
        Kind::RemoteControlPlane,
        Kind::LocalControlPlane,
        Kind::KubernetesController,
        Kind::RemoteController,
        Kind::LocalController,
        Kind::RemoteAgent,
        Kind::LocalAgent,
        Kind::AgentConfig,
        Kind::Volume,
        Kind::Registry,
        Kind::CatalogItem,
        Kind::Application,
        Kind::ApplicationTemplate,
        Kind::Microservice,
        Kind::Route,
        Kind::EdgeResource,
    ];

    /// Canonical name as written in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::KubernetesControlPlane => "KubernetesControlPlane",
            Kind::RemoteControlPlane => "RemoteControlPlane",
            Kind::LocalControlPlane => "LocalControlPlane",
            Kind::KubernetesController => "KubernetesController",
            Kind::RemoteController => "RemoteController",
            Kind::LocalController => "LocalController",
            Kind::RemoteAgent => "RemoteAgent",
            Kind::LocalAgent => "LocalAgent",
            Kind::AgentConfig => "AgentConfig",
            Kind::Volume => "Volume",
            Kind::Registry => "Registry",
            Kind::CatalogItem => "CatalogItem",
            Kind::Application => "Application",
            Kind::ApplicationTemplate => "ApplicationTemplate",
            Kind::Microservice => "Microservice",
            Kind::Route => "Route",
            Kind::EdgeResource => "EdgeResource",
        }
    }

    /// Whether this kind declares a whole control plane
    pub fn is_control_plane(&self) -> bool {
        matches!(
            self,
            Kind::KubernetesControlPlane | Kind::RemoteControlPlane | Kind::LocalControlPlane
        )
    }

    /// Whether this kind declares a single controller
    pub fn is_controller(&self) -> bool {
        matches!(
            self,
            Kind::KubernetesController | Kind::RemoteController | Kind::LocalController
        )
    }

    /// Whether this kind declares an agent
    pub fn is_agent(&self) -> bool {
        matches!(self, Kind::RemoteAgent | Kind::LocalAgent)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for kinds this build does not know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl std::fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let kind = match s.trim() {
            "ControlPlane" => Kind::RemoteControlPlane,
            "Controller" => Kind::RemoteController,
            "Agent" => Kind::RemoteAgent,
            other => Kind::ALL
                .into_iter()
                .find(|k| k.as_str() == other)
                .ok_or_else(|| UnknownKind(s.to_string()))?,
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!("ControlPlane".parse::<Kind>().unwrap(), Kind::RemoteControlPlane);
        assert_eq!("Agent".parse::<Kind>().unwrap(), Kind::RemoteAgent);
        assert_eq!("LocalAgent".parse::<Kind>().unwrap(), Kind::LocalAgent);
        assert!("Gadget".parse::<Kind>().is_err());
    }

    #[test]
    fn test_kind_round_trips_through_name() {
        for kind in Kind::ALL {
            assert_eq!(kind.as_str().parse::<Kind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_namespace_mismatch() {
        let header = Header {
            api_version: "edgefleet.io/v3".to_string(),
            kind: "RemoteAgent".to_string(),
            metadata: Metadata {
                name: "r1".to_string(),
                namespace: Some("prod".to_string()),
                tags: vec![],
            },
            spec: serde_yaml::Value::Null,
        };
        assert!(header.check_namespace("prod").is_ok());
        let err = header.check_namespace("staging").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("prod") && msg.contains("staging"));
    }
}
