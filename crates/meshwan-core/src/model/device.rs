// ── Device domain type ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{ConnectivityMode, GitOpsParam, Metadata, RegistrationState};
use super::resource::IpsecResource;

/// An edge node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub metadata: Metadata,
    pub spec: DeviceSpec,
    #[serde(default)]
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSpec {
    #[serde(default)]
    pub public_ips: Vec<String>,
    /// Only connect through hubs, never directly to other devices.
    #[serde(default)]
    pub force_hub_connectivity: bool,
    /// Hub to link to once registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_hub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_hub_port: Option<u16>,
    /// Base64-encoded kubeconfig.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ops_param: Option<GitOpsParam>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ConnectivityMode>,
    /// Public IP (mode 1) or overlay IP (mode 2).
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub cert_name: String,
    #[serde(default)]
    pub registration: RegistrationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// SCC-side resource deployed for a proxied device, kept verbatim so
    /// deletion can redeclare exactly what was installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scc_resource: Option<IpsecResource>,
    /// Hub name -> data IP allocated for that hub link.
    #[serde(default)]
    pub data_ips: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(name: impl Into<String>, spec: DeviceSpec) -> Self {
        Self {
            metadata: Metadata::named(name),
            spec,
            status: DeviceStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether this device may form direct device-to-device tunnels.
    pub fn accepts_direct_peers(&self) -> bool {
        self.status.mode == Some(ConnectivityMode::Direct)
            && self.status.registration == RegistrationState::Success
            && !self.spec.force_hub_connectivity
    }
}
