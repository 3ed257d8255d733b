// ── Connection objects ──
//
// A connection is one IPsec tunnel between two named ends. The pair is
// unordered: lookups try both key orders (see `crate::connections`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::common::EntityKind;
use super::device::Device;
use super::hub::Hub;
use super::overlay::Overlay;
use super::resource::ResourceDescriptor;
use crate::error::{CoreError, Result};

/// Which pair of endpoint kinds a tunnel joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TopologyKind {
    HubToHub,
    HubToDevice,
    DeviceToDevice,
}

impl TopologyKind {
    pub fn parse(value: &str) -> Result<Self> {
        value
            .parse()
            .map_err(|_| CoreError::UnknownConnectionType(value.to_owned()))
    }
}

/// The object owning one end of a connection.
///
/// `Overlay` stands for the SCC itself, which terminates tunnels for
/// proxied devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "object")]
pub enum EndpointOwner {
    Overlay(Overlay),
    Hub(Hub),
    Device(Device),
}

impl EndpointOwner {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Overlay(_) => EntityKind::Overlay,
            Self::Hub(_) => EntityKind::Hub,
            Self::Device(_) => EntityKind::Device,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Overlay(o) => o.name(),
            Self::Hub(h) => h.name(),
            Self::Device(d) => d.name(),
        }
    }

    /// Connection end name, e.g. `Hub.h1`.
    pub fn end_name(&self) -> String {
        end_name(self.entity_kind(), self.name())
    }

    /// The address peers use to reach this end.
    pub fn resolved_ip(&self) -> Option<&str> {
        let ip = match self {
            Self::Overlay(_) => return None,
            Self::Hub(h) => h.status.ip.as_str(),
            Self::Device(d) => d.status.ip.as_str(),
        };
        (!ip.is_empty()).then_some(ip)
    }

    pub fn cert_name(&self) -> &str {
        match self {
            Self::Overlay(o) => &o.status.cert_name,
            Self::Hub(h) => &h.status.cert_name,
            Self::Device(d) => &d.status.cert_name,
        }
    }
}

pub fn end_name(kind: EntityKind, name: &str) -> String {
    format!("{kind}.{name}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEnd {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub ip: String,
    pub owner: EndpointOwner,
}

impl ConnectionEnd {
    /// End addressed at the owner's resolved IP.
    pub fn new(owner: EndpointOwner) -> Result<Self> {
        let ip = owner.resolved_ip().map(str::to_owned).ok_or_else(|| {
            CoreError::validation(format!("{} has no resolved IP yet", owner.end_name()))
        })?;
        Ok(Self::with_ip(owner, ip))
    }

    /// End addressed at an explicit IP (e.g. an allocated data IP).
    pub fn with_ip(owner: EndpointOwner, ip: impl Into<String>) -> Self {
        Self {
            name: owner.end_name(),
            kind: owner.entity_kind(),
            ip: ip.into(),
            owner,
        }
    }
}

/// One resource provisioned for a connection on one target cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub target: EndpointOwner,
    pub name: String,
    pub kind: String,
    /// Shared by other connections on the same target; never removed
    /// when this connection is torn down.
    pub reserved: bool,
    pub resource: ResourceDescriptor,
}

impl ResourceRef {
    pub fn new(target: EndpointOwner, resource: ResourceDescriptor, reserved: bool) -> Self {
        Self {
            target,
            name: resource.name().to_owned(),
            kind: resource.kind().to_owned(),
            reserved,
            resource,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum ConnectionState {
    #[default]
    Created,
    Deployed,
    Undeployed,
    Error,
}

impl ConnectionState {
    /// A record in this state holds no live deployment and may be driven again.
    pub fn can_redeploy(self) -> bool {
        matches!(self, Self::Undeployed | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionObject {
    pub overlay: String,
    pub topology: TopologyKind,
    pub end1: ConnectionEnd,
    pub end2: ConnectionEnd,
    pub resources: Vec<ResourceRef>,
    #[serde(default)]
    pub state: ConnectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConnectionObject {
    /// Whether `name` is one of the two ends.
    pub fn involves(&self, name: &str) -> bool {
        self.end1.name == name || self.end2.name == name
    }

    /// The end that is not `name`.
    pub fn peer_of(&self, name: &str) -> Option<&ConnectionEnd> {
        if self.end1.name == name {
            Some(&self.end2)
        } else if self.end2.name == name {
            Some(&self.end1)
        } else {
            None
        }
    }

    pub(crate) fn mark(&mut self, state: ConnectionState, error: Option<String>) {
        self.state = state;
        self.error = error;
        self.updated_at = Some(Utc::now());
    }
}
