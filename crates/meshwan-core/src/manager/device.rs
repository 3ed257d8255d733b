use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use meshwan_api::sync::models::ResourceAction;
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use super::context::ManagerContext;
use super::hub_device::HubDeviceManager;
use super::iprange::IpRangeManager;
use super::{EntityManager, edge};
use crate::deploy::ClusterId;
use crate::error::{CoreError, Result};
use crate::model::connection::end_name;
use crate::model::{
    ClusterType, ConnectionEnd, ConnectivityMode, Device, DeviceStatus, EndpointOwner,
    EntityKind, IpsecResource, Overlay, Proposal, ProposalResource, RegistrationState, ResourceDescriptor,
    TopologyKind, validate_name,
};
use crate::registration::{PollOutcome, RegistrationKey};
use crate::store::{StoreKey, keys};

/// Edge devices.
///
/// The connectivity mode is fixed at creation:
///
/// - no kubeconfig: GitOps-managed (mode 3), the referenced objects must exist
/// - public IPs: probed in order, first reachable one is used (mode 1)
/// - neither: an overlay IP is allocated and the SCC is configured to
///   terminate a tunnel from the device (mode 2)
#[derive(Clone)]
pub struct DeviceManager {
    ctx: Arc<ManagerContext>,
}

impl DeviceManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    async fn save(&self, overlay: &str, device: &Device) -> Result<()> {
        self.ctx
            .store
            .put(keys::DEVICES, &self.store_key(overlay, device.name()), device)
            .await
    }

    /// Apply `change` to the stored device under its record lock.
    pub(crate) async fn modify<F>(&self, overlay: &str, name: &str, change: F) -> Result<Device>
    where
        F: FnOnce(&mut Device) -> Result<bool> + Send,
    {
        self.ctx
            .modify(
                keys::DEVICES,
                &self.store_key(overlay, name),
                EntityKind::Device,
                name,
                change,
            )
            .await
    }

    async fn preprocess(&self, overlay: &str, device: &mut Device) -> Result<()> {
        let Some(encoded) = device.spec.kube_config.clone() else {
            edge::check_gitops(&self.ctx, device.spec.git_ops_param.as_ref()).await?;
            device.status.mode = Some(ConnectivityMode::GitOps);
            device.status.ip = device.spec.public_ips.first().cloned().unwrap_or_default();
            return Ok(());
        };
        let kubeconfig = edge::parse_kubeconfig(&encoded)?;

        if device.spec.public_ips.is_empty() {
            self.attach_to_scc(overlay, device).await
        } else {
            device.status.ip =
                edge::resolve_public_ip(&self.ctx, &kubeconfig, &device.spec.public_ips).await?;
            device.status.mode = Some(ConnectivityMode::Direct);
            Ok(())
        }
    }

    /// Mode 2: allocate an overlay IP and deploy the SCC responder for it.
    /// The allocation is released again if the deployment fails.
    async fn attach_to_scc(&self, overlay: &str, device: &mut Device) -> Result<()> {
        let overlay_obj = self.ctx.require_overlay(overlay).await?;
        let proposals = self.ctx.topology().load_proposals(overlay).await?;
        let ipranges = IpRangeManager::new(self.ctx.clone());
        let ip = ipranges.allocate(overlay, device.name()).await?.to_string();

        match self
            .deploy_scc(overlay, &overlay_obj, device, &ip, &proposals)
            .await
        {
            Ok(resource) => {
                info!(overlay, device = %device.name(), %ip, "device proxied through SCC");
                device.status.ip = ip;
                device.status.scc_resource = Some(resource);
                device.status.cert_name = ClusterType::Device.cert_name(device.name());
                device.status.mode = Some(ConnectivityMode::Proxied);
                Ok(())
            }
            Err(e) => {
                if let Err(free_err) = ipranges.free(overlay, &ip).await {
                    warn!(overlay, %ip, error = %free_err, "could not release overlay IP");
                }
                Err(e)
            }
        }
    }

    async fn deploy_scc(
        &self,
        overlay: &str,
        overlay_obj: &Overlay,
        device: &Device,
        ip: &str,
        proposals: &[Proposal],
    ) -> Result<IpsecResource> {
        let end = ConnectionEnd::with_ip(EndpointOwner::Device(device.clone()), ip);
        let resource = self
            .ctx
            .topology()
            .build_scc_resource(overlay_obj, &end, proposals)
            .await?;

        let scc = ClusterId::scc();
        let mut res = self.ctx.res_util();
        for proposal in proposals {
            res.add_resource(
                &scc,
                ResourceAction::Create,
                ResourceDescriptor::Proposal(ProposalResource::from_proposal(overlay, proposal)),
            );
        }
        res.add_resource(
            &scc,
            ResourceAction::Create,
            ResourceDescriptor::Ipsec(resource.clone()),
        );
        res.deploy(&scc_unit_name(overlay, device.name())).await?;
        Ok(resource)
    }

    /// Undo `attach_to_scc` using the stored descriptor.
    async fn detach_from_scc(&self, overlay: &str, device: &Device) -> Result<()> {
        if let Some(resource) = &device.status.scc_resource {
            let mut res = self.ctx.res_util();
            res.add_resource(
                &ClusterId::scc(),
                ResourceAction::Delete,
                ResourceDescriptor::Ipsec(resource.clone()),
            );
            res.undeploy(&scc_unit_name(overlay, device.name())).await?;
        }
        if !device.status.ip.is_empty() {
            match IpRangeManager::new(self.ctx.clone())
                .free(overlay, &device.status.ip)
                .await
            {
                Ok(()) | Err(CoreError::NotAllocated { .. } | CoreError::OutOfRange { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub(crate) fn start_registration(&self, overlay: &str, name: &str) {
        let manager = self.clone();
        let (overlay, name) = (overlay.to_owned(), name.to_owned());
        self.ctx.registrations.start(
            RegistrationKey::new(EntityKind::Device, &overlay, &name),
            self.ctx.config.poll_interval,
            move || {
                let manager = manager.clone();
                let (overlay, name) = (overlay.clone(), name.clone());
                async move { manager.poll_registration(&overlay, &name).await }
            },
        );
    }

    /// Restart polling for every device of `overlay` still pending.
    pub async fn resume_registrations(&self, overlay: &str) -> Result<usize> {
        let pending: Vec<Device> = self
            .list(overlay)
            .await?
            .into_iter()
            .filter(|d| d.status.registration == RegistrationState::Pending)
            .collect();
        for device in &pending {
            self.start_registration(overlay, device.name());
        }
        Ok(pending.len())
    }

    pub async fn poll_registration(&self, overlay: &str, name: &str) -> PollOutcome {
        match self.try_poll(overlay, name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(overlay, device = name, error = %e, "registration poll failed");
                PollOutcome::Pending
            }
        }
    }

    async fn try_poll(&self, overlay: &str, name: &str) -> Result<PollOutcome> {
        let Some(device) = self
            .ctx
            .store
            .get::<Device>(keys::DEVICES, &self.store_key(overlay, name))
            .await?
        else {
            return Ok(PollOutcome::Finished);
        };
        if device.status.registration != RegistrationState::Pending {
            return Ok(PollOutcome::Finished);
        }

        match self.complete(overlay, &device).await {
            Ok(()) => {
                let device = self
                    .modify(overlay, name, |stored| {
                        stored.status.registration = RegistrationState::Success;
                        stored.status.registered_at = Some(Utc::now());
                        stored.status.message = None;
                        stored.status.cert_name = ClusterType::Device.cert_name(name);
                        Ok(true)
                    })
                    .await?;
                info!(overlay, device = name, ip = %device.status.ip, "device registered");
                self.establish(overlay, &device).await;
                Ok(PollOutcome::Finished)
            }
            Err(e) if e.is_unauthorized() => {
                self.modify(overlay, name, |stored| {
                    stored.status.registration = RegistrationState::Failed;
                    stored.status.message = Some(e.to_string());
                    Ok(true)
                })
                .await?;
                warn!(overlay, device = name, error = %e, "device registration failed");
                Ok(PollOutcome::Finished)
            }
            Err(e) => {
                debug!(overlay, device = name, error = %e, "device not ready yet");
                let message = e.to_string();
                if device.status.message.as_deref() != Some(message.as_str()) {
                    self.modify(overlay, name, |stored| {
                        stored.status.message = Some(message);
                        Ok(true)
                    })
                    .await?;
                }
                Ok(PollOutcome::Pending)
            }
        }
    }

    async fn complete(&self, overlay: &str, device: &Device) -> Result<()> {
        let mode = device.status.mode.ok_or_else(|| {
            CoreError::Internal(format!("device '{}' has no mode", device.name()))
        })?;
        edge::register(
            &self.ctx,
            &ClusterId::for_entity(overlay, EntityKind::Device, device.name()),
            mode,
            device.spec.kube_config.as_deref(),
            &device.status.ip,
            device.spec.git_ops_param.as_ref(),
        )
        .await?;
        self.ctx
            .certs
            .get_or_create(overlay, device.name(), ClusterType::Device, false)
            .await?;
        Ok(())
    }

    /// Links a freshly registered device: direct tunnels to every device
    /// that accepts them, plus its proxy hub if one is configured.
    async fn establish(&self, overlay: &str, device: &Device) {
        if device.accepts_direct_peers() {
            if let Err(e) = self.mesh_with_devices(overlay, device).await {
                warn!(overlay, device = %device.name(), error = %e, "device mesh failed");
            }
        }

        let Some(hub) = device.spec.proxy_hub.as_deref() else {
            return;
        };
        match HubDeviceManager::new(self.ctx.clone())
            .connect(overlay, hub, device.name())
            .await
        {
            Ok(_) | Err(CoreError::AlreadyExists { .. }) => {}
            Err(e) => {
                warn!(overlay, device = %device.name(), hub, error = %e, "proxy hub link failed");
            }
        }
    }

    async fn mesh_with_devices(&self, overlay: &str, device: &Device) -> Result<()> {
        let connections = ConnectionManager::new(self.ctx.clone());
        let own_end = end_name(EntityKind::Device, device.name());

        for peer in self.list(overlay).await? {
            if peer.name() == device.name() || !peer.accepts_direct_peers() {
                continue;
            }
            let peer_end = end_name(EntityKind::Device, peer.name());
            if let Some(existing) = connections.get(overlay, &own_end, &peer_end).await? {
                if !existing.state.can_redeploy() {
                    continue;
                }
            }
            let result = async {
                let a = ConnectionEnd::new(EndpointOwner::Device(device.clone()))?;
                let b = ConnectionEnd::new(EndpointOwner::Device(peer.clone()))?;
                connections
                    .connect(overlay, a, b, TopologyKind::DeviceToDevice)
                    .await
            }
            .await;
            if let Err(e) = result {
                warn!(overlay, device = %device.name(), peer = %peer.name(), error = %e, "direct link failed");
            }
        }
        Ok(())
    }
}

fn scc_unit_name(overlay: &str, device: &str) -> String {
    format!("{overlay}-scc-device-{device}")
}

#[async_trait]
impl EntityManager for DeviceManager {
    type Entity = Device;
    type Parent = str;

    fn kind(&self) -> EntityKind {
        EntityKind::Device
    }

    fn store_key(&self, overlay: &str, name: &str) -> StoreKey {
        keys::child(overlay, "device", name)
    }

    async fn create(&self, overlay: &str, mut device: Device) -> Result<Device> {
        self.ctx.require_overlay(overlay).await?;
        validate_name(self.kind(), device.name())?;
        if self
            .ctx
            .store
            .exists(keys::DEVICES, &self.store_key(overlay, device.name()))
            .await?
        {
            return Err(ManagerContext::already_exists(self.kind(), device.name()));
        }

        device.status = DeviceStatus::default();
        self.preprocess(overlay, &mut device).await?;
        if let Err(e) = self.save(overlay, &device).await {
            // Do not leak the SCC side of a device that was never stored.
            if device.status.mode == Some(ConnectivityMode::Proxied) {
                if let Err(cleanup) = self.detach_from_scc(overlay, &device).await {
                    warn!(overlay, device = %device.name(), error = %cleanup, "SCC cleanup failed");
                }
            }
            return Err(e);
        }
        self.start_registration(overlay, device.name());
        info!(
            overlay,
            device = %device.name(),
            mode = ?device.status.mode,
            ip = %device.status.ip,
            "device created"
        );
        Ok(device)
    }

    async fn get(&self, overlay: &str, name: &str) -> Result<Device> {
        self.ctx
            .load(keys::DEVICES, &self.store_key(overlay, name), self.kind(), name)
            .await
    }

    async fn list(&self, overlay: &str) -> Result<Vec<Device>> {
        self.ctx
            .store
            .list(keys::DEVICES, &self.store_key(overlay, ""))
            .await
    }

    /// Only the description can change; connectivity is fixed at creation.
    async fn update(&self, overlay: &str, name: &str, device: Device) -> Result<Device> {
        self.modify(overlay, name, |current| {
            if device.name() != name || device.spec != current.spec {
                return Err(CoreError::validation(format!(
                    "device '{name}' can only change its description; delete and re-create it"
                )));
            }
            current.metadata.description = device.metadata.description;
            Ok(true)
        })
        .await
    }

    async fn delete(&self, overlay: &str, name: &str) -> Result<()> {
        self.ctx
            .registrations
            .cancel(&RegistrationKey::new(EntityKind::Device, overlay, name))
            .await;
        let key = self.store_key(overlay, name);
        let Some(device) = self.ctx.store.get::<Device>(keys::DEVICES, &key).await? else {
            return Ok(());
        };

        ConnectionManager::new(self.ctx.clone())
            .disconnect_all(overlay, &end_name(EntityKind::Device, name))
            .await?;
        if device.status.mode == Some(ConnectivityMode::Proxied) {
            self.detach_from_scc(overlay, &device).await?;
        }
        self.ctx
            .certs
            .delete_by_type(overlay, name, ClusterType::Device)
            .await?;
        self.ctx
            .registry
            .unregister_cluster(&ClusterId::for_entity(overlay, EntityKind::Device, name))
            .await?;
        self.ctx.store.delete(keys::DEVICES, &key).await?;
        self.ctx.forget_record_lock(keys::DEVICES, &key);
        info!(overlay, device = name, "device deleted");
        Ok(())
    }
}
