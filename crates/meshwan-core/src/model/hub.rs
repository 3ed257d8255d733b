// ── Hub domain type ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{ConnectivityMode, GitOpsParam, Metadata, RegistrationState};

/// First port handed out for hub-side device proxies.
pub const PROXY_PORT_MIN: u16 = 10000;
/// Last port handed out for hub-side device proxies.
pub const PROXY_PORT_MAX: u16 = 16000;

/// An aggregation node with a stable, reachable address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hub {
    pub metadata: Metadata,
    pub spec: HubSpec,
    #[serde(default)]
    pub status: HubStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSpec {
    #[serde(default)]
    pub public_ips: Vec<String>,
    /// Base64-encoded kubeconfig.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ops_param: Option<GitOpsParam>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ConnectivityMode>,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub cert_name: String,
    /// Device name -> proxy port on this hub.
    #[serde(default)]
    pub proxy_ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub registration: RegistrationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
}

impl Hub {
    pub fn new(name: impl Into<String>, spec: HubSpec) -> Self {
        Self {
            metadata: Metadata::named(name),
            spec,
            status: HubStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Lowest free proxy port, or `None` when the window is exhausted.
    pub fn next_proxy_port(&self) -> Option<u16> {
        (PROXY_PORT_MIN..=PROXY_PORT_MAX)
            .find(|port| !self.status.proxy_ports.values().any(|used| used == port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_ports_fill_lowest_gap() {
        let mut hub = Hub::new("h1", HubSpec::default());
        assert_eq!(hub.next_proxy_port(), Some(PROXY_PORT_MIN));

        hub.status.proxy_ports.insert("d1".into(), 10000);
        hub.status.proxy_ports.insert("d2".into(), 10002);
        assert_eq!(hub.next_proxy_port(), Some(10001));
    }
}
