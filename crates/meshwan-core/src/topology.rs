// ── Topology connection builder ──
//
// Given two ends and a topology kind, produce the resources both ends
// need: every overlay proposal (shared, reserved) plus one ipsec resource
// per end. Which end initiates and how each end is addressed depends on
// the topology:
//
//   hub-to-hub        VTI <-> VTI, each remote is the peer IP
//   hub-to-device     hub: VTI responder (%any, remote source = device IP)
//                     device: policy-based, remote = hub IP, %config source
//   device-to-device  policy <-> policy, each remote is the peer IP
//
// The only I/O here is certificate retrieval.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::certs::CertificateOrchestrator;
use crate::error::{CoreError, Result};
use crate::model::resource::{
    REMOTE_ANY, SOURCE_IP_CONFIG, UPDOWN_IPTABLES, UPDOWN_VTI,
};
use crate::model::{
    CertificateData, ClusterType, ConnectionEnd, ConnectionObject, ConnectionState,
    EndpointOwner, EntityKind, IpsecConnection, IpsecMode, IpsecResource, Overlay, Proposal,
    ProposalResource, ResourceDescriptor, ResourceRef, TopologyKind,
};
use crate::store::{TypedStore, keys};

const AUTH_PUBKEY: &str = "pubkey";

/// Addressing of one end, decided by the topology.
struct EndLayout {
    mode: IpsecMode,
    remote: String,
    remote_source_ip: Option<String>,
    local_source_ip: Option<String>,
    updown: &'static str,
}

#[derive(Clone)]
pub struct TopologyBuilder {
    store: TypedStore,
    certs: Arc<CertificateOrchestrator>,
}

impl TopologyBuilder {
    pub fn new(store: TypedStore, certs: Arc<CertificateOrchestrator>) -> Self {
        Self { store, certs }
    }

    /// Every proposal of `overlay`; an overlay without any cannot carry
    /// tunnels.
    pub async fn load_proposals(&self, overlay: &str) -> Result<Vec<Proposal>> {
        let proposals: Vec<Proposal> = self
            .store
            .list(keys::PROPOSALS, &keys::child(overlay, "proposal", ""))
            .await?;
        if proposals.is_empty() {
            return Err(CoreError::MissingProposal {
                overlay: overlay.to_owned(),
            });
        }
        Ok(proposals)
    }

    /// Build (but do not deploy) the connection between `a` and `b`.
    ///
    /// For hub-to-device the hub always ends up as `end1`.
    pub async fn build_connection(
        &self,
        overlay: &str,
        a: ConnectionEnd,
        b: ConnectionEnd,
        topology: TopologyKind,
    ) -> Result<ConnectionObject> {
        let proposals = self.load_proposals(overlay).await?;
        let (end1, end2) = order_ends(a, b, topology)?;

        let keys1 = self.end_keys(overlay, &end1).await?;
        let keys2 = self.end_keys(overlay, &end2).await?;

        let (layout1, layout2) = match topology {
            TopologyKind::HubToHub => (vti(&end2.ip, None), vti(&end1.ip, None)),
            TopologyKind::HubToDevice => (
                vti(REMOTE_ANY, Some(end2.ip.clone())),
                EndLayout {
                    mode: IpsecMode::PolicyBased,
                    remote: end1.ip.clone(),
                    remote_source_ip: None,
                    local_source_ip: Some(SOURCE_IP_CONFIG.into()),
                    updown: UPDOWN_IPTABLES,
                },
            ),
            TopologyKind::DeviceToDevice => (policy(&end2.ip), policy(&end1.ip)),
        };

        let proposal_names: Vec<String> = proposals
            .iter()
            .map(|p| ProposalResource::from_proposal(overlay, p).name)
            .collect();

        let ipsec1 = ipsec_resource(overlay, &end2, &keys1, &keys2, layout1, &proposal_names);
        let ipsec2 = ipsec_resource(overlay, &end1, &keys2, &keys1, layout2, &proposal_names);

        let mut resources = Vec::with_capacity(2 * (proposals.len() + 1));
        for (end, ipsec) in [(&end1, ipsec1), (&end2, ipsec2)] {
            for proposal in &proposals {
                resources.push(ResourceRef::new(
                    end.owner.clone(),
                    ResourceDescriptor::Proposal(ProposalResource::from_proposal(overlay, proposal)),
                    true,
                ));
            }
            resources.push(ResourceRef::new(
                end.owner.clone(),
                ResourceDescriptor::Ipsec(ipsec),
                false,
            ));
        }

        debug!(
            overlay,
            end1 = %end1.name,
            end2 = %end2.name,
            %topology,
            resources = resources.len(),
            "connection built"
        );

        Ok(ConnectionObject {
            overlay: overlay.to_owned(),
            topology,
            end1,
            end2,
            resources,
            state: ConnectionState::Created,
            error: None,
            deployment_id: None,
            updated_at: None,
        })
    }

    /// SCC-side responder for a proxied device reachable at `device.ip`.
    ///
    /// The SCC identifies itself with the overlay CA certificate.
    pub async fn build_scc_resource(
        &self,
        overlay: &Overlay,
        device: &ConnectionEnd,
        proposals: &[Proposal],
    ) -> Result<IpsecResource> {
        let scc = ConnectionEnd::with_ip(EndpointOwner::Overlay(overlay.clone()), "");
        let scc_keys = self.end_keys(overlay.name(), &scc).await?;
        let device_keys = self.end_keys(overlay.name(), device).await?;
        let proposal_names: Vec<String> = proposals
            .iter()
            .map(|p| ProposalResource::from_proposal(overlay.name(), p).name)
            .collect();

        Ok(ipsec_resource(
            overlay.name(),
            device,
            &scc_keys,
            &device_keys,
            vti(REMOTE_ANY, Some(device.ip.clone())),
            &proposal_names,
        ))
    }

    async fn end_keys(&self, overlay: &str, end: &ConnectionEnd) -> Result<EndKeys> {
        let cluster_type = match end.kind {
            EntityKind::Overlay => ClusterType::Overlay,
            EntityKind::Hub => ClusterType::Hub,
            EntityKind::Device => ClusterType::Device,
            other => {
                return Err(CoreError::validation(format!(
                    "{other} cannot terminate a connection"
                )));
            }
        };
        let entity = end.owner.name();
        let is_ca = cluster_type == ClusterType::Overlay;
        let mut data = self
            .certs
            .get_or_create(overlay, entity, cluster_type, is_ca)
            .await?;
        // The overlay CA verifies its own peers.
        if is_ca {
            data.ca.clone_from(&data.cert);
        }
        Ok(EndKeys {
            cert_name: cluster_type.cert_name(entity),
            data,
        })
    }
}

struct EndKeys {
    cert_name: String,
    data: CertificateData,
}

fn order_ends(
    a: ConnectionEnd,
    b: ConnectionEnd,
    topology: TopologyKind,
) -> Result<(ConnectionEnd, ConnectionEnd)> {
    use EntityKind::{Device, Hub};
    match (topology, a.kind, b.kind) {
        (TopologyKind::HubToHub, Hub, Hub)
        | (TopologyKind::HubToDevice, Hub, Device)
        | (TopologyKind::DeviceToDevice, Device, Device) => Ok((a, b)),
        (TopologyKind::HubToDevice, Device, Hub) => Ok((b, a)),
        _ => Err(CoreError::validation(format!(
            "{topology} cannot join {} and {}",
            a.name, b.name
        ))),
    }
}

fn vti(remote: &str, remote_source_ip: Option<String>) -> EndLayout {
    EndLayout {
        mode: IpsecMode::VtiBased,
        remote: remote.to_owned(),
        remote_source_ip,
        local_source_ip: None,
        updown: UPDOWN_VTI,
    }
}

fn policy(remote: &str) -> EndLayout {
    EndLayout {
        mode: IpsecMode::PolicyBased,
        remote: remote.to_owned(),
        remote_source_ip: None,
        local_source_ip: None,
        updown: UPDOWN_VTI,
    }
}

/// Resource installed on the end owning `local_keys`, pointing at `peer`.
fn ipsec_resource(
    overlay: &str,
    peer: &ConnectionEnd,
    local_keys: &EndKeys,
    peer_keys: &EndKeys,
    layout: EndLayout,
    proposals: &[String],
) -> IpsecResource {
    let name = format!("{overlay}-{}", peer.name.to_lowercase().replace('.', "-"));
    IpsecResource {
        connections: vec![IpsecConnection::tunnel(
            format!("{name}-conn"),
            layout.updown,
            proposals,
        )],
        name,
        mode: layout.mode,
        remote: layout.remote,
        authentication_method: AUTH_PUBKEY.into(),
        public_cert: STANDARD.encode(&local_keys.data.cert),
        private_cert: STANDARD.encode(&local_keys.data.key),
        shared_ca: STANDARD.encode(&local_keys.data.ca),
        local_identifier: format!("CN={}", local_keys.cert_name),
        remote_identifier: format!("CN={}", peer_keys.cert_name),
        remote_source_ip: layout.remote_source_ip,
        local_source_ip: layout.local_source_ip,
        crypto_proposal: proposals.to_vec(),
        force_crypto_proposal: "0".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::model::{Device, DeviceSpec, Hub, HubSpec};
    use crate::store::MemoryStore;
    use crate::test_support::FakeIssuer;

    async fn builder(proposals: &[&str]) -> TopologyBuilder {
        let store = TypedStore::new(Arc::new(MemoryStore::new()));
        for name in proposals {
            store
                .put(
                    keys::PROPOSALS,
                    &keys::child("ov1", "proposal", name),
                    &Proposal::new(*name, "aes256", "sha256", "modp4096"),
                )
                .await
                .unwrap();
        }
        let certs = Arc::new(CertificateOrchestrator::new(
            Arc::new(FakeIssuer::default()),
            &OrchestratorConfig::default(),
        ));
        certs
            .get_or_create("ov1", "ov1", ClusterType::Overlay, true)
            .await
            .unwrap();
        TopologyBuilder::new(store, certs)
    }

    fn hub(name: &str, ip: &str) -> ConnectionEnd {
        let mut hub = Hub::new(name, HubSpec::default());
        hub.status.ip = ip.into();
        ConnectionEnd::new(EndpointOwner::Hub(hub)).unwrap()
    }

    fn device(name: &str, ip: &str) -> ConnectionEnd {
        let mut device = Device::new(name, DeviceSpec::default());
        device.status.ip = ip.into();
        ConnectionEnd::new(EndpointOwner::Device(device)).unwrap()
    }

    fn ipsec_on<'a>(conn: &'a ConnectionObject, owner: &str) -> &'a IpsecResource {
        conn.resources
            .iter()
            .find_map(|r| match &r.resource {
                ResourceDescriptor::Ipsec(ipsec) if r.target.name() == owner => Some(ipsec),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn hub_to_device_puts_hub_first_with_vti_responder() {
        let builder = builder(&["p1"]).await;
        let conn = builder
            .build_connection(
                "ov1",
                device("d1", "10.10.0.5"),
                hub("h1", "203.0.113.1"),
                TopologyKind::HubToDevice,
            )
            .await
            .unwrap();

        assert_eq!(conn.end1.name, "Hub.h1");
        assert_eq!(conn.end2.name, "Device.d1");

        let on_hub = ipsec_on(&conn, "h1");
        assert_eq!(on_hub.mode, IpsecMode::VtiBased);
        assert_eq!(on_hub.remote, "%any");
        assert_eq!(on_hub.remote_source_ip.as_deref(), Some("10.10.0.5"));
        assert_eq!(on_hub.local_identifier, "CN=hub-h1-cert");
        assert_eq!(on_hub.remote_identifier, "CN=device-d1-cert");
        assert_eq!(on_hub.name, "ov1-device-d1");

        let on_device = ipsec_on(&conn, "d1");
        assert_eq!(on_device.mode, IpsecMode::PolicyBased);
        assert_eq!(on_device.remote, "203.0.113.1");
        assert_eq!(on_device.local_source_ip.as_deref(), Some("%config"));
        assert_eq!(on_device.connections[0].local_updown, UPDOWN_IPTABLES);
        assert_eq!(on_device.crypto_proposal, vec!["ov1-p1".to_owned()]);
    }

    #[tokio::test]
    async fn hub_to_hub_is_vti_on_both_ends() {
        let builder = builder(&["p1"]).await;
        let conn = builder
            .build_connection(
                "ov1",
                hub("h1", "203.0.113.1"),
                hub("h2", "203.0.113.2"),
                TopologyKind::HubToHub,
            )
            .await
            .unwrap();

        let h1 = ipsec_on(&conn, "h1");
        let h2 = ipsec_on(&conn, "h2");
        assert_eq!((h1.mode, h2.mode), (IpsecMode::VtiBased, IpsecMode::VtiBased));
        assert_eq!(h1.remote, "203.0.113.2");
        assert_eq!(h2.remote, "203.0.113.1");
    }

    #[tokio::test]
    async fn device_to_device_is_policy_based_on_both_ends() {
        let builder = builder(&["p1"]).await;
        let conn = builder
            .build_connection(
                "ov1",
                device("d1", "198.51.100.1"),
                device("d2", "198.51.100.2"),
                TopologyKind::DeviceToDevice,
            )
            .await
            .unwrap();

        let d1 = ipsec_on(&conn, "d1");
        let d2 = ipsec_on(&conn, "d2");
        assert_eq!(d1.mode, IpsecMode::PolicyBased);
        assert_eq!(d2.mode, IpsecMode::PolicyBased);
        assert_eq!(d1.remote, "198.51.100.2");
        assert_eq!(d1.local_source_ip, None);
    }

    #[tokio::test]
    async fn proposals_are_reserved_and_ipsec_is_not() {
        let builder = builder(&["p1", "p2"]).await;
        let conn = builder
            .build_connection(
                "ov1",
                hub("h1", "203.0.113.1"),
                hub("h2", "203.0.113.2"),
                TopologyKind::HubToHub,
            )
            .await
            .unwrap();

        // Two proposals plus one ipsec resource per end.
        assert_eq!(conn.resources.len(), 6);
        for r in &conn.resources {
            match r.resource {
                ResourceDescriptor::Proposal(_) => assert!(r.reserved),
                ResourceDescriptor::Ipsec(_) => assert!(!r.reserved),
            }
        }
        assert_eq!(conn.state, ConnectionState::Created);
    }

    #[tokio::test]
    async fn no_proposals_is_missing_proposal() {
        let builder = builder(&[]).await;
        let err = builder
            .build_connection(
                "ov1",
                hub("h1", "203.0.113.1"),
                hub("h2", "203.0.113.2"),
                TopologyKind::HubToHub,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingProposal { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn mismatched_ends_are_rejected() {
        let builder = builder(&["p1"]).await;
        let err = builder
            .build_connection(
                "ov1",
                hub("h1", "203.0.113.1"),
                device("d1", "198.51.100.1"),
                TopologyKind::DeviceToDevice,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn scc_resource_uses_overlay_ca() {
        let builder = builder(&["p1"]).await;
        let resource = builder
            .build_scc_resource(
                &Overlay::new("ov1"),
                &device("d1", "10.10.0.2"),
                &[Proposal::new("p1", "aes256", "sha256", "modp4096")],
            )
            .await
            .unwrap();

        assert_eq!(resource.mode, IpsecMode::VtiBased);
        assert_eq!(resource.remote, "%any");
        assert_eq!(resource.remote_source_ip.as_deref(), Some("10.10.0.2"));
        assert_eq!(resource.local_identifier, "CN=ov1-cert");
        assert_eq!(resource.shared_ca, STANDARD.encode("cert:ov1-cert"));
    }
}
