//! Controller REST client contract and its HTTP implementation

use crate::cache::ClientFactory;
use crate::{Error, Result};
use async_trait::async_trait;
use fleet_manifest::Kind;
use fleet_store::{AdminUser, AgentConfiguration, ControlPlane, Resource, RouterMode, normalize_endpoint};
use reqwest::Method;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Agent as known by a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    /// Agent name
    pub name: String,
    /// Controller-assigned identifier
    pub uuid: String,
    /// Router mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_mode: Option<RouterMode>,
    /// UUIDs of the upstream routers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_routers: Vec<String>,
    /// UUID of the network router
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_router: Option<String>,
    /// Host the agent is reachable on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Body used to create or update an agent on a controller.
///
/// Router references in `config` are controller UUIDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    /// Agent name
    pub name: String,
    /// Router configuration
    #[serde(flatten)]
    pub config: AgentConfiguration,
}

/// Operations the engine needs from a deployed controller
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Every agent registered on the controller
    async fn list_agents(&self) -> Result<Vec<AgentInfo>>;

    /// Look up one agent; NotFound if it is not registered
    async fn get_agent_by_name(&self, name: &str) -> Result<AgentInfo>;

    /// Register a new agent
    async fn create_agent(&self, agent: &AgentRegistration) -> Result<AgentInfo>;

    /// Update an existing agent
    async fn update_agent(&self, uuid: &str, agent: &AgentRegistration) -> Result<AgentInfo>;

    /// Remove an agent
    async fn delete_agent(&self, uuid: &str) -> Result<()>;

    /// Issue a provisioning key for an agent
    async fn provision_key(&self, uuid: &str) -> Result<String>;

    /// Create or replace an application-layer resource
    async fn apply_resource(&self, kind: Kind, name: &str, body: Value) -> Result<()>;

    /// Remove an application-layer resource
    async fn delete_resource(&self, kind: Kind, name: &str) -> Result<()>;
}

/// REST path segment of application-layer kinds
fn resource_path(kind: Kind) -> Result<&'static str> {
    let path = match kind {
        Kind::Microservice => "microservices",
        Kind::Application => "applications",
        Kind::ApplicationTemplate => "application-templates",
        Kind::CatalogItem => "catalog/microservices",
        Kind::Registry => "registries",
        Kind::Route => "routes",
        Kind::EdgeResource => "edge-resources",
        other => {
            return Err(Error::NotSupported(format!(
                "{other} is not a controller resource"
            )));
        }
    };
    Ok(path)
}

/// Controller client speaking the controller REST API
pub struct HttpControllerClient {
    base_url: String,
    http: Client,
    token: String,
}

impl HttpControllerClient {
    /// Log in to the controller at `endpoint`
    pub async fn connect(endpoint: &str, admin: &AdminUser) -> Result<Self> {
        let base_url = format!("{}/api/v3", normalize_endpoint(endpoint));
        let login_url = format!("{base_url}/user/login");
        let credentials = json!({ "email": admin.email, "password": admin.password });
        debug!("Logging in to {} as {}", base_url, admin.email);

        let (http, token) = smol::unblock(move || {
            let http = Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
            let response = http
                .post(&login_url)
                .json(&credentials)
                .send()
                .map_err(|e| transport_error(&login_url, e))?;
            let body = decode_response(Method::POST, &login_url, response)?;
            let token = body
                .get("accessToken")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Internal("login response has no access token".to_string()))?
                .to_string();
            Ok::<_, Error>((http, token))
        })
        .await?;

        Ok(Self {
            base_url,
            http,
            token,
        })
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let http = self.http.clone();
        let url = format!("{}/{}", self.base_url, path);
        let token = self.token.clone();
        smol::unblock(move || {
            let mut request = http.request(method.clone(), &url).bearer_auth(token);
            if let Some(body) = body {
                request = request.json(&body);
            }
            let response = request.send().map_err(|e| transport_error(&url, e))?;
            decode_response(method, &url, response)
        })
        .await
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> Error {
    Error::Internal(format!("request to {url} failed: {e}"))
}

fn decode_response(method: Method, url: &str, response: reqwest::blocking::Response) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .map_err(|e| Error::Internal(format!("failed to read response from {url}: {e}")))?;

    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text)
            .map_err(|e| Error::Internal(format!("invalid JSON from {url}: {e}")));
    }

    let message = format!("{method} {url} returned {status}: {}", text.trim());
    Err(match status.as_u16() {
        404 => Error::NotFound(message),
        409 => Error::Conflict(message),
        400 | 401 | 403 => Error::Input(message),
        501 => Error::NotSupported(message),
        _ => Error::Internal(message),
    })
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Internal(format!("unexpected {what}: {e}")))
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    async fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        let body = self.request(Method::GET, "agents", None).await?;
        let agents = body.get("agents").cloned().unwrap_or(Value::Array(Vec::new()));
        decode(agents, "agent list")
    }

    async fn get_agent_by_name(&self, name: &str) -> Result<AgentInfo> {
        self.list_agents()
            .await?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::NotFound(format!("agent '{name}' is not registered on the controller")))
    }

    async fn create_agent(&self, agent: &AgentRegistration) -> Result<AgentInfo> {
        let body = serde_json::to_value(agent).map_err(|e| Error::Internal(e.to_string()))?;
        let created = self.request(Method::POST, "agents", Some(body)).await?;
        decode(created, "agent")
    }

    async fn update_agent(&self, uuid: &str, agent: &AgentRegistration) -> Result<AgentInfo> {
        let body = serde_json::to_value(agent).map_err(|e| Error::Internal(e.to_string()))?;
        let updated = self
            .request(Method::PATCH, &format!("agents/{uuid}"), Some(body))
            .await?;
        decode(updated, "agent")
    }

    async fn delete_agent(&self, uuid: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("agents/{uuid}"), None).await?;
        Ok(())
    }

    async fn provision_key(&self, uuid: &str) -> Result<String> {
        let body = self
            .request(Method::GET, &format!("agents/{uuid}/provisioning-key"), None)
            .await?;
        body.get("key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Internal(format!("no provisioning key returned for agent {uuid}")))
    }

    async fn apply_resource(&self, kind: Kind, name: &str, body: Value) -> Result<()> {
        let path = format!("{}/{}", resource_path(kind)?, name);
        self.request(Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    async fn delete_resource(&self, kind: Kind, name: &str) -> Result<()> {
        let path = format!("{}/{}", resource_path(kind)?, name);
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }
}

/// Builds [`HttpControllerClient`]s from a namespace's control plane
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn connect(&self, namespace: &str, control_plane: &ControlPlane) -> Result<Arc<dyn ControllerClient>> {
        let endpoint = control_plane.endpoint().ok_or_else(|| {
            Error::NotFound(format!(
                "control plane of namespace '{namespace}' has no endpoint yet"
            ))
        })?;
        let client = HttpControllerClient::connect(endpoint, control_plane.admin()).await?;
        Ok(Arc::new(client))
    }
}
