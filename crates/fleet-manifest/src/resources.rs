//! Application-layer resource specs
//!
//! These resources live on the controller, not in the local store. The
//! deploy engine decodes them here, validates the few fields it depends on
//! and forwards the rest to the controller unchanged.

use crate::{ManifestError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decode a document spec into a typed resource
pub fn decode_spec<T: DeserializeOwned>(kind: &str, name: &str, spec: &serde_yaml::Value) -> Result<T> {
    let spec = if spec.is_null() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        spec.clone()
    };
    serde_yaml::from_value(spec)
        .map_err(|e| ManifestError::Validation(format!("{kind} '{name}': {e}")))
}

/// Common behavior of controller-side resources
pub trait ControllerResource: Serialize {
    /// Validate fields the engine relies on
    fn validate(&self, name: &str) -> Result<()>;

    /// JSON body sent to the controller
    fn to_body(&self, name: &str) -> Result<serde_json::Value> {
        let mut body = serde_json::to_value(self)
            .map_err(|e| ManifestError::Validation(format!("'{name}': {e}")))?;
        if let serde_json::Value::Object(map) = &mut body {
            map.insert("name".to_string(), serde_json::Value::String(name.to_string()));
        }
        Ok(body)
    }
}

fn require(field: &str, value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ManifestError::Validation(format!(
            "'{name}': {field} must not be empty"
        )));
    }
    Ok(())
}

/// Container images per architecture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Images {
    /// amd64 image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x86: Option<String>,
    /// arm image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm: Option<String>,
    /// Registry the images are pulled from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Catalog item providing the images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_item_id: Option<u64>,
}

impl Images {
    fn is_empty(&self) -> bool {
        self.x86.is_none() && self.arm.is_none() && self.catalog_item_id.is_none()
    }
}

/// Microservice deployed on an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Microservice {
    /// Name of the agent running the microservice
    pub agent: String,
    /// Owning application
    #[serde(default)]
    pub application: String,
    /// Images to run
    #[serde(default)]
    pub images: Images,
    /// Container configuration passed through to the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<serde_json::Value>,
    /// Microservice configuration passed through to the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl ControllerResource for Microservice {
    fn validate(&self, name: &str) -> Result<()> {
        require("agent", &self.agent, name)?;
        require("application", &self.application, name)?;
        if self.images.is_empty() {
            return Err(ManifestError::Validation(format!(
                "microservice '{name}' declares no image"
            )));
        }
        Ok(())
    }
}

/// Route between two microservices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Source microservice
    pub from: String,
    /// Destination microservice
    pub to: String,
}

impl ControllerResource for Route {
    fn validate(&self, name: &str) -> Result<()> {
        require("from", &self.from, name)?;
        require("to", &self.to, name)?;
        if self.from == self.to {
            return Err(ManifestError::Validation(format!(
                "route '{name}' connects '{}' to itself",
                self.from
            )));
        }
        Ok(())
    }
}

/// Application grouping microservices and routes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Inline microservices
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub microservices: Vec<serde_json::Value>,
    /// Inline routes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<serde_json::Value>,
    /// Template this application instantiates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<serde_json::Value>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ControllerResource for Application {
    fn validate(&self, name: &str) -> Result<()> {
        if self.microservices.is_empty() && self.template.is_none() {
            return Err(ManifestError::Validation(format!(
                "application '{name}' needs microservices or a template"
            )));
        }
        Ok(())
    }
}

/// Reusable application definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationTemplate {
    /// Human-readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Template variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<serde_json::Value>,
    /// Application body
    pub application: serde_json::Value,
}

impl ControllerResource for ApplicationTemplate {
    fn validate(&self, name: &str) -> Result<()> {
        if self.application.is_null() {
            return Err(ManifestError::Validation(format!(
                "application template '{name}' has no application"
            )));
        }
        Ok(())
    }
}

/// Catalog item describing a reusable microservice image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// amd64 image
    #[serde(default)]
    pub x86: String,
    /// arm image
    #[serde(default)]
    pub arm: String,
    /// Registry name
    #[serde(default = "default_registry")]
    pub registry: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Config example handed to the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_example: Option<String>,
}

fn default_registry() -> String {
    "remote".to_string()
}

impl ControllerResource for CatalogItem {
    fn validate(&self, name: &str) -> Result<()> {
        if self.x86.trim().is_empty() && self.arm.trim().is_empty() {
            return Err(ManifestError::Validation(format!(
                "catalog item '{name}' declares no image"
            )));
        }
        Ok(())
    }
}

/// Container registry credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    /// Registry URL
    pub url: String,
    /// Login user
    #[serde(default)]
    pub username: String,
    /// Login password
    #[serde(default)]
    pub password: String,
    /// Login email
    #[serde(default)]
    pub email: String,
    /// Whether the registry is private
    #[serde(default)]
    pub private: bool,
}

impl ControllerResource for Registry {
    fn validate(&self, name: &str) -> Result<()> {
        require("url", &self.url, name)?;
        if self.private {
            require("username", &self.username, name)?;
            require("password", &self.password, name)?;
        }
        Ok(())
    }
}

/// Interface exposed by an edge resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResourceInterface {
    /// Protocol, e.g. `https`
    pub protocol: String,
    /// Endpoints, passed through unchanged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<serde_json::Value>,
}

/// Edge resource describing a device or service reachable from agents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResource {
    /// Resource version
    pub version: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Interface protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_protocol: Option<String>,
    /// Interface definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<EdgeResourceInterface>,
    /// Display metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub display: BTreeMap<String, String>,
    /// Custom properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl ControllerResource for EdgeResource {
    fn validate(&self, name: &str) -> Result<()> {
        require("version", &self.version, name)
    }
}
