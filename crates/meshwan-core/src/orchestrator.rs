// ── Orchestrator facade ──
//
// Single entry point for consumers. Owns the shared manager context and
// hands out cheap manager handles.

use std::sync::Arc;

use meshwan_api::{IssuerClient, ReachabilityProbe, SyncClient};
use tracing::info;

use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::manager::{
    CertificateManager, Collaborators, ConnectionManager, DeviceManager, EntityManager,
    HubDeviceManager, HubManager, IpRangeManager, ManagerContext, OverlayManager,
    ProposalManager,
};
use crate::store::DocumentStore;

impl Collaborators {
    /// Collaborators backed by the real HTTP services.
    pub fn remote(sync: SyncClient, issuer: IssuerClient, probe: ReachabilityProbe) -> Self {
        let sync = Arc::new(sync);
        Self {
            issuer: Arc::new(issuer),
            sync: sync.clone(),
            registry: sync,
            prober: Arc::new(probe),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<ManagerContext>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn DocumentStore>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            ctx: Arc::new(ManagerContext::new(config, store, collaborators)),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        self.ctx.config()
    }

    pub fn overlays(&self) -> OverlayManager {
        OverlayManager::new(self.ctx.clone())
    }

    pub fn proposals(&self) -> ProposalManager {
        ProposalManager::new(self.ctx.clone())
    }

    pub fn ip_ranges(&self) -> IpRangeManager {
        IpRangeManager::new(self.ctx.clone())
    }

    pub fn hubs(&self) -> HubManager {
        HubManager::new(self.ctx.clone())
    }

    pub fn devices(&self) -> DeviceManager {
        DeviceManager::new(self.ctx.clone())
    }

    pub fn certificates(&self) -> CertificateManager {
        CertificateManager::new(self.ctx.clone())
    }

    pub fn connections(&self) -> ConnectionManager {
        ConnectionManager::new(self.ctx.clone())
    }

    pub fn hub_devices(&self) -> HubDeviceManager {
        HubDeviceManager::new(self.ctx.clone())
    }

    /// Restart background registration for every pending hub and device,
    /// e.g. after reloading persisted state.
    pub async fn resume_registrations(&self) -> Result<usize> {
        let mut resumed = 0;
        for overlay in self.overlays().list(&()).await? {
            resumed += self.hubs().resume_registrations(overlay.name()).await?;
            resumed += self.devices().resume_registrations(overlay.name()).await?;
        }
        if resumed > 0 {
            info!(resumed, "registration polling resumed");
        }
        Ok(resumed)
    }

    /// Cancel every registration task.
    pub async fn shutdown(&self) {
        self.ctx.registrations.shutdown().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use futures_util::future::join_all;
    use meshwan_api::KubeConfig;
    use meshwan_api::sync::models::ClusterCredentials;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::deploy::ClusterId;
    use crate::error::CoreError;
    use crate::model::{
        ConnectionEnd, ConnectionState, ConnectivityMode, Device, DeviceSpec, EndpointOwner,
        EntityKind, GitOpsParam, Hub, HubSpec, IpRange, Overlay, Proposal, RegistrationState,
        TopologyKind,
    };
    use crate::test_support::{Harness, kubeconfig_b64};

    async fn setup() -> Harness {
        let h = Harness::new();
        let o = &h.orchestrator;
        o.overlays().create(&(), Overlay::new("ov1")).await.unwrap();
        o.proposals()
            .create("ov1", Proposal::new("p1", "aes256", "sha256", "modp4096"))
            .await
            .unwrap();
        o.ip_ranges()
            .create("ov1", IpRange::new("r1", "10.10.0.0", 1, 20))
            .await
            .unwrap();
        h
    }

    /// Let registration tasks run for a few poll periods.
    async fn settle() {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    fn hub(name: &str, ip: &str) -> Hub {
        Hub::new(
            name,
            HubSpec {
                public_ips: vec![ip.into()],
                kube_config: Some(kubeconfig_b64()),
                git_ops_param: None,
            },
        )
    }

    fn direct_device(name: &str, ips: &[&str]) -> Device {
        Device::new(
            name,
            DeviceSpec {
                public_ips: ips.iter().map(|ip| (*ip).to_owned()).collect(),
                kube_config: Some(kubeconfig_b64()),
                ..DeviceSpec::default()
            },
        )
    }

    fn registered_server(h: &Harness, cluster: &str) -> String {
        let registration = h
            .registry
            .registered()
            .into_iter()
            .find(|r| r.cluster == cluster)
            .unwrap();
        let ClusterCredentials::KubeConfig { kube_config } = registration.credentials else {
            panic!("expected kubeconfig credentials");
        };
        let cfg = KubeConfig::from_base64(&kube_config).unwrap();
        cfg.server().unwrap().host_str().unwrap().to_owned()
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_creation_provisions_its_ca() {
        let h = setup().await;
        let overlay = h.orchestrator.overlays().get(&(), "ov1").await.unwrap();
        assert_eq!(overlay.status.cert_name, "ov1-cert");
        assert_eq!(overlay.status.issuer_name, "ov1-issuer");
        assert!(h.issuer.has_issuer("ov1-issuer"));
        assert_eq!(h.issuer.issuer_of("ov1-cert").as_deref(), Some("meshwan-root-issuer"));
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_with_children_cannot_be_deleted() {
        let h = setup().await;
        let err = h.orchestrator.overlays().delete(&(), "ov1").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }), "got {err:?}");

        h.orchestrator.proposals().delete("ov1", "p1").await.unwrap();
        h.orchestrator.ip_ranges().delete("ov1", "r1").await.unwrap();
        h.orchestrator.overlays().delete(&(), "ov1").await.unwrap();
        assert!(!h.issuer.has_issuer("ov1-issuer"));
    }

    #[tokio::test(start_paused = true)]
    async fn children_need_an_existing_overlay() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .hubs()
            .create("nope", hub("h1", "203.0.113.1"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, CoreError::NotFound { kind: EntityKind::Overlay, .. }),
            "got {err:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_names_are_rejected_by_every_manager() {
        let h = setup().await;
        let o = &h.orchestrator;

        let errors = [
            o.overlays().create(&(), Overlay::new("Ov_2")).await.unwrap_err(),
            o.proposals()
                .create("ov1", Proposal::new("P1", "aes256", "sha256", "modp4096"))
                .await
                .unwrap_err(),
            o.ip_ranges()
                .create("ov1", IpRange::new("-r2", "10.20.0.0", 1, 20))
                .await
                .unwrap_err(),
            o.hubs().create("ov1", hub("hub_1", "203.0.113.1")).await.unwrap_err(),
            o.devices()
                .create("ov1", direct_device("", &["198.51.100.1"]))
                .await
                .unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, CoreError::Validation { .. }), "got {err:?}");
        }
        assert!(h.prober.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_reachable_public_ip_wins() {
        let h = setup().await;
        h.prober.make_reachable("198.51.100.2");

        let device = h
            .orchestrator
            .devices()
            .create("ov1", direct_device("d1", &["198.51.100.1", "198.51.100.2"]))
            .await
            .unwrap();
        assert_eq!(device.status.mode, Some(ConnectivityMode::Direct));
        assert_eq!(device.status.ip, "198.51.100.2");
        assert_eq!(device.status.registration, RegistrationState::Pending);
        assert_eq!(h.prober.calls(), vec!["198.51.100.1", "198.51.100.2"]);

        settle().await;
        let device = h.orchestrator.devices().get("ov1", "d1").await.unwrap();
        assert_eq!(device.status.registration, RegistrationState::Success);
        assert_eq!(device.status.cert_name, "device-d1-cert");
        assert_eq!(registered_server(&h, "device-d1"), "198.51.100.2");
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_public_ips_fail_creation() {
        let h = setup().await;
        let err = h
            .orchestrator
            .devices()
            .create("ov1", direct_device("d1", &["198.51.100.1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Registration { .. }), "got {err:?}");
        assert!(h.orchestrator.devices().list("ov1").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn device_without_public_ip_is_proxied_through_scc() {
        let h = setup().await;
        let device = h
            .orchestrator
            .devices()
            .create("ov1", direct_device("d1", &[]))
            .await
            .unwrap();

        assert_eq!(device.status.mode, Some(ConnectivityMode::Proxied));
        assert_eq!(device.status.ip, "10.10.0.1");
        let scc = h.sync.installed_on(&ClusterId::scc());
        let kinds: Vec<&str> = scc.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["IpsecProposal", "IpsecSite"]);
        assert_eq!(
            device.status.scc_resource.as_ref().map(|r| r.name.as_str()),
            Some("ov1-device-d1")
        );

        // Registration goes through the overlay IP.
        h.prober.make_reachable("10.10.0.1");
        settle().await;
        let device = h.orchestrator.devices().get("ov1", "d1").await.unwrap();
        assert_eq!(device.status.registration, RegistrationState::Success);
        assert_eq!(registered_server(&h, "device-d1"), "10.10.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn proxied_device_needs_a_proposal() {
        let h = setup().await;
        h.orchestrator.proposals().delete("ov1", "p1").await.unwrap();

        let err = h
            .orchestrator
            .devices()
            .create("ov1", direct_device("d1", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingProposal { .. }), "got {err:?}");
        let range = h.orchestrator.ip_ranges().get("ov1", "r1").await.unwrap();
        assert!(!range.in_use());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_scc_deployment_releases_the_overlay_ip() {
        let h = setup().await;
        h.sync.reject_installs("scc busy");

        let err = h
            .orchestrator
            .devices()
            .create("ov1", direct_device("d1", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Deployment { .. }), "got {err:?}");
        let range = h.orchestrator.ip_ranges().get("ov1", "r1").await.unwrap();
        assert!(!range.in_use());
    }

    #[tokio::test(start_paused = true)]
    async fn gitops_device_checks_referenced_objects() {
        let h = setup().await;
        let gitops = Device::new(
            "d1",
            DeviceSpec {
                git_ops_param: Some(GitOpsParam {
                    git_ops_type: "github".into(),
                    reference_object: "repo-ref".into(),
                    resource_object: "repo-res".into(),
                }),
                ..DeviceSpec::default()
            },
        );

        let err = h
            .orchestrator
            .devices()
            .create("ov1", gitops.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }), "got {err:?}");

        h.registry.add_gitops_object("github", "repo-ref");
        h.registry.add_gitops_object("github", "repo-res");
        let device = h.orchestrator.devices().create("ov1", gitops).await.unwrap();
        assert_eq!(device.status.mode, Some(ConnectivityMode::GitOps));
        assert!(h.prober.calls().is_empty());

        settle().await;
        let device = h.orchestrator.devices().get("ov1", "d1").await.unwrap();
        assert_eq!(device.status.registration, RegistrationState::Success);
        let registration = h.registry.registered().pop().unwrap();
        assert!(matches!(registration.credentials, ClusterCredentials::GitOps { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credentials_fail_registration() {
        let h = setup().await;
        h.prober.make_reachable("198.51.100.1");
        h.orchestrator
            .devices()
            .create("ov1", direct_device("d1", &["198.51.100.1"]))
            .await
            .unwrap();
        h.prober.reject_credentials("198.51.100.1");

        settle().await;
        let device = h.orchestrator.devices().get("ov1", "d1").await.unwrap();
        assert_eq!(device.status.registration, RegistrationState::Failed);
        assert!(device.status.message.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn registered_hubs_form_a_mesh() {
        let h = setup().await;
        h.prober.make_reachable("203.0.113.1");
        h.prober.make_reachable("203.0.113.2");
        let hubs = h.orchestrator.hubs();
        hubs.create("ov1", hub("h1", "203.0.113.1")).await.unwrap();
        settle().await;
        hubs.create("ov1", hub("h2", "203.0.113.2")).await.unwrap();
        settle().await;

        let conn = h
            .orchestrator
            .connections()
            .get("ov1", "Hub.h1", "Hub.h2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conn.topology, TopologyKind::HubToHub);
        assert_eq!(conn.state, ConnectionState::Deployed);
        assert!(conn.deployment_id.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn direct_devices_connect_to_each_other() {
        let h = setup().await;
        h.prober.make_reachable("198.51.100.1");
        h.prober.make_reachable("198.51.100.2");
        let devices = h.orchestrator.devices();
        devices
            .create("ov1", direct_device("d1", &["198.51.100.1"]))
            .await
            .unwrap();
        settle().await;
        devices
            .create("ov1", direct_device("d2", &["198.51.100.2"]))
            .await
            .unwrap();
        settle().await;

        let listed = h
            .orchestrator
            .connections()
            .list_by_endpoint("ov1", "Device.d1")
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].topology, TopologyKind::DeviceToDevice);
    }

    #[tokio::test(start_paused = true)]
    async fn proxy_hub_link_allocates_and_releases() {
        let h = setup().await;
        h.prober.make_reachable("203.0.113.1");
        h.prober.make_reachable("198.51.100.1");
        h.orchestrator
            .hubs()
            .create("ov1", hub("h1", "203.0.113.1"))
            .await
            .unwrap();
        settle().await;

        let mut device = direct_device("d1", &["198.51.100.1"]);
        device.spec.proxy_hub = Some("h1".into());
        device.spec.force_hub_connectivity = true;
        h.orchestrator.devices().create("ov1", device).await.unwrap();
        settle().await;

        let conn = h
            .orchestrator
            .connections()
            .get("ov1", "Device.d1", "Hub.h1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conn.end1.name, "Hub.h1");
        assert_eq!(conn.end2.ip, "10.10.0.1");

        let links = h.orchestrator.hub_devices().list("ov1", "h1").await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].proxy_port, 10000);
        assert_eq!(links[0].data_ip.as_deref(), Some("10.10.0.1"));

        h.orchestrator.devices().delete("ov1", "d1").await.unwrap();

        let hub = h.orchestrator.hubs().get("ov1", "h1").await.unwrap();
        assert!(hub.status.proxy_ports.is_empty());
        let range = h.orchestrator.ip_ranges().get("ov1", "r1").await.unwrap();
        assert!(!range.in_use());
        assert!(
            h.orchestrator
                .connections()
                .list("ov1")
                .await
                .unwrap()
                .is_empty()
        );
        // Shared proposals stay on the hub.
        let removed = h
            .sync
            .removed_from(&ClusterId::for_entity("ov1", EntityKind::Hub, "h1"));
        let kinds: Vec<&str> = removed.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["IpsecSite"]);
        assert!(h.registry.unregistered().contains(&"ov1+device-d1".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_deployment_marks_the_connection() {
        let h = setup().await;
        h.prober.make_reachable("203.0.113.1");
        h.prober.make_reachable("203.0.113.2");
        let hubs = h.orchestrator.hubs();
        hubs.create("ov1", hub("h1", "203.0.113.1")).await.unwrap();
        settle().await;

        h.sync.reject_installs("hub offline");
        hubs.create("ov1", hub("h2", "203.0.113.2")).await.unwrap();
        settle().await;

        let conn = h
            .orchestrator
            .connections()
            .get("ov1", "Hub.h1", "Hub.h2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conn.state, ConnectionState::Error);
        assert_eq!(conn.error.as_deref(), Some("Deployment failed: hub offline"));

        // Never installed, so removal skips the uninstall call.
        h.sync.accept_installs();
        hubs.delete("ov1", "h2").await.unwrap();
        assert!(h.sync.uninstalled().is_empty());
        assert!(
            h.orchestrator
                .connections()
                .list("ov1")
                .await
                .unwrap()
                .is_empty()
        );
    }

    /// Two registered hubs whose mesh link failed to install; the sync
    /// service accepts installs again afterwards.
    async fn failed_hub_link() -> Harness {
        let h = setup().await;
        h.prober.make_reachable("203.0.113.1");
        h.prober.make_reachable("203.0.113.2");
        let hubs = h.orchestrator.hubs();
        hubs.create("ov1", hub("h1", "203.0.113.1")).await.unwrap();
        settle().await;
        h.sync.reject_installs("hub offline");
        hubs.create("ov1", hub("h2", "203.0.113.2")).await.unwrap();
        settle().await;
        h.sync.accept_installs();
        h
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connection_can_be_redeployed() {
        let h = failed_hub_link().await;
        let connections = h.orchestrator.connections();

        // Nothing retries on its own.
        tokio::time::sleep(Duration::from_secs(60)).await;
        let conn = connections.get("ov1", "Hub.h1", "Hub.h2").await.unwrap().unwrap();
        assert_eq!(conn.state, ConnectionState::Error);

        let conn = connections.redeploy("ov1", "Hub.h1", "Hub.h2").await.unwrap();
        assert_eq!(conn.state, ConnectionState::Deployed);
        assert_eq!(conn.error, None);
        assert!(conn.deployment_id.is_some());

        let stored = connections.get("ov1", "Hub.h2", "Hub.h1").await.unwrap().unwrap();
        assert_eq!(stored.state, ConnectionState::Deployed);

        let err = connections.redeploy("ov1", "Hub.h1", "Hub.h9").await.unwrap_err();
        assert!(
            matches!(err, CoreError::NotFound { kind: EntityKind::Connection, .. }),
            "got {err:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_rebuilds_a_failed_connection() {
        let h = failed_hub_link().await;
        let hubs = h.orchestrator.hubs();
        let connections = h.orchestrator.connections();
        let a = ConnectionEnd::new(EndpointOwner::Hub(hubs.get("ov1", "h1").await.unwrap())).unwrap();
        let b = ConnectionEnd::new(EndpointOwner::Hub(hubs.get("ov1", "h2").await.unwrap())).unwrap();

        let conn = connections
            .connect("ov1", a.clone(), b.clone(), TopologyKind::HubToHub)
            .await
            .unwrap();
        assert_eq!(conn.state, ConnectionState::Deployed);
        // Rebuilt in the other end order, still a single record.
        assert_eq!(connections.list("ov1").await.unwrap().len(), 1);

        let err = connections
            .connect("ov1", a, b, TopologyKind::HubToHub)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists { .. }), "got {err:?}");
    }

    /// Poll in real time until every hub and device has registered.
    async fn wait_for_registrations(h: &Harness) {
        for _ in 0..500 {
            let hubs = h.orchestrator.hubs().list("ov1").await.unwrap();
            let devices = h.orchestrator.devices().list("ov1").await.unwrap();
            if hubs
                .iter()
                .map(|hub| hub.status.registration)
                .chain(devices.iter().map(|d| d.status.registration))
                .all(|state| state == RegistrationState::Success)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registrations did not finish");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_hub_links_keep_every_proxy_port() {
        let h = setup().await;
        h.prober.make_reachable("203.0.113.1");
        h.orchestrator
            .hubs()
            .create("ov1", hub("h1", "203.0.113.1"))
            .await
            .unwrap();
        for i in 1..=12 {
            let ip = format!("198.51.100.{i}");
            h.prober.make_reachable(&ip);
            let mut device = direct_device(&format!("d{i}"), &[ip.as_str()]);
            device.spec.force_hub_connectivity = true;
            h.orchestrator.devices().create("ov1", device).await.unwrap();
        }
        wait_for_registrations(&h).await;

        let attach = (1..=12).map(|i| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .hub_devices()
                    .connect("ov1", "h1", &format!("d{i}"))
                    .await
            })
        });
        for result in join_all(attach).await {
            result.unwrap().unwrap();
        }

        let hub = h.orchestrator.hubs().get("ov1", "h1").await.unwrap();
        assert_eq!(hub.status.proxy_ports.len(), 12);
        let ports: BTreeSet<u16> = hub.status.proxy_ports.values().copied().collect();
        assert_eq!(ports.len(), 12);

        let links = h.orchestrator.hub_devices().list("ov1", "h1").await.unwrap();
        let data_ips: BTreeSet<String> = links.iter().filter_map(|l| l.data_ip.clone()).collect();
        assert_eq!(data_ips.len(), 12);
        assert_eq!(h.orchestrator.connections().list("ov1").await.unwrap().len(), 12);

        // A second attach of a linked device is refused and keeps its port.
        let err = h
            .orchestrator
            .hub_devices()
            .connect("ov1", "h1", "d1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists { .. }), "got {err:?}");
        let hub = h.orchestrator.hubs().get("ov1", "h1").await.unwrap();
        assert_eq!(hub.status.proxy_ports.len(), 12);

        h.orchestrator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn proxied_device_teardown_uses_the_proposals_it_was_deployed_with() {
        let h = setup().await;
        h.orchestrator
            .devices()
            .create("ov1", direct_device("d1", &[]))
            .await
            .unwrap();

        let proposals = h.orchestrator.proposals();
        proposals
            .create("ov1", Proposal::new("p2", "aes128", "sha1", "modp2048"))
            .await
            .unwrap();
        proposals.delete("ov1", "p1").await.unwrap();

        h.orchestrator.devices().delete("ov1", "d1").await.unwrap();

        let removed = h.sync.removed_from(&ClusterId::scc());
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].kind, "IpsecSite");
        let doc: serde_yaml::Value = serde_yaml::from_str(&removed[0].content).unwrap();
        let offered: Vec<&str> = doc["spec"]["cryptoProposal"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(|p| p.as_str())
            .collect();
        assert_eq!(offered, vec!["ov1-p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_poll_saves_only_a_changed_message() {
        let h = setup().await;
        h.prober.make_reachable("198.51.100.1");
        h.orchestrator
            .devices()
            .create("ov1", direct_device("d1", &["198.51.100.1"]))
            .await
            .unwrap();
        // Reachable at creation, unreachable while registering.
        h.prober.make_unreachable("198.51.100.1");

        settle().await;
        let device = h.orchestrator.devices().get("ov1", "d1").await.unwrap();
        assert_eq!(device.status.registration, RegistrationState::Pending);
        assert!(device.status.message.is_some());

        // Same failure on later polls: nothing is written.
        let version = h.store.version();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.store.version(), version);

        h.orchestrator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_proxied_device_tears_down_scc_side() {
        let h = setup().await;
        h.orchestrator
            .devices()
            .create("ov1", direct_device("d1", &[]))
            .await
            .unwrap();

        h.orchestrator.devices().delete("ov1", "d1").await.unwrap();

        let removed = h.sync.removed_from(&ClusterId::scc());
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "ov1-device-d1");
        let range = h.orchestrator.ip_ranges().get("ov1", "r1").await.unwrap();
        assert!(!range.in_use());
        assert!(h.orchestrator.devices().get("ov1", "d1").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_restarts_pending_registrations() {
        let h = setup().await;
        h.prober.make_reachable("198.51.100.1");
        h.orchestrator
            .devices()
            .create("ov1", direct_device("d1", &["198.51.100.1"]))
            .await
            .unwrap();
        h.orchestrator.shutdown().await;

        assert_eq!(h.orchestrator.resume_registrations().await.unwrap(), 1);
        settle().await;
        let device = h.orchestrator.devices().get("ov1", "d1").await.unwrap();
        assert_eq!(device.status.registration, RegistrationState::Success);
        assert_eq!(h.orchestrator.resume_registrations().await.unwrap(), 0);
    }
}
