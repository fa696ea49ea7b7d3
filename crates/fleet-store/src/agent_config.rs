//! Router-relevant agent configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Name of the router every control plane ships with.
///
/// It is a valid upstream target even when no agent of that name is known.
pub const DEFAULT_ROUTER_NAME: &str = "default-router";

/// Role an agent plays in the message-routing mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// Leaf router connecting upstream only
    Edge,
    /// Router accepting connections from other routers
    Interior,
    /// No router at all
    None,
}

impl std::fmt::Display for RouterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RouterMode::Edge => "edge",
            RouterMode::Interior => "interior",
            RouterMode::None => "none",
        };
        f.write_str(s)
    }
}

/// Router topology and placement settings of an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfiguration {
    /// Router mode, `edge` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_mode: Option<RouterMode>,

    /// Agents this agent's router connects up to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_routers: Vec<String>,

    /// Single upstream router used for the network bridge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_router: Option<String>,

    /// Address other routers use to reach this agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// AMQP messaging port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messaging_port: Option<u16>,

    /// Port edge routers connect to (interior only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_router_port: Option<u16>,

    /// Port interior routers connect to (interior only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter_router_port: Option<u16>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Latitude of the edge node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    /// Longitude of the edge node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl AgentConfiguration {
    /// Effective router mode
    pub fn mode(&self) -> RouterMode {
        self.router_mode.unwrap_or(RouterMode::Edge)
    }

    /// Names of the agents this configuration depends on.
    ///
    /// Upstream routers come first, followed by the network router; duplicates
    /// are reported once. A `none` router has no dependencies.
    pub fn dependencies(&self) -> Vec<String> {
        if self.mode() == RouterMode::None {
            return Vec::new();
        }
        let mut deps: Vec<String> = Vec::new();
        let candidates = self
            .upstream_routers
            .iter()
            .chain(self.network_router.iter());
        for dep in candidates {
            let dep = dep.trim();
            if !dep.is_empty() && !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        }
        deps
    }

    /// Check the router invariants for the agent called `name`
    pub fn validate(&self, name: &str) -> Result<()> {
        self.validate_routing(name)?;
        let mode = self.mode();
        if mode != RouterMode::None
            && self.host.as_deref().map(str::trim).unwrap_or_default().is_empty()
        {
            return Err(Error::invalid(
                "agent configuration",
                name,
                format!("router mode {mode} requires a host"),
            ));
        }
        Ok(())
    }

    /// Check every router invariant except the host requirement.
    ///
    /// Used for configurations whose host is filled in later from the
    /// agent they configure.
    pub fn validate_routing(&self, name: &str) -> Result<()> {
        let mode = self.mode();
        if mode == RouterMode::None && !self.upstream_routers.is_empty() {
            return Err(Error::invalid(
                "agent configuration",
                name,
                "router mode none cannot have upstream routers",
            ));
        }
        if mode != RouterMode::Interior
            && (self.edge_router_port.is_some() || self.inter_router_port.is_some())
        {
            return Err(Error::invalid(
                "agent configuration",
                name,
                format!("router ports are only allowed in interior mode, mode is {mode}"),
            ));
        }
        if self.upstream_routers.iter().any(|up| up == name)
            || self.network_router.as_deref() == Some(name)
        {
            return Err(Error::invalid(
                "agent configuration",
                name,
                "an agent cannot be its own upstream router",
            ));
        }
        Ok(())
    }
}
