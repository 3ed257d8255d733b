use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use super::context::ManagerContext;
use super::{EntityManager, edge};
use crate::deploy::ClusterId;
use crate::error::{CoreError, Result};
use crate::model::connection::end_name;
use crate::model::{
    ClusterType, ConnectionEnd, ConnectivityMode, EndpointOwner, EntityKind, Hub, HubStatus,
    RegistrationState, TopologyKind, validate_name,
};
use crate::registration::{PollOutcome, RegistrationKey};
use crate::store::{StoreKey, keys};

#[derive(Clone)]
pub struct HubManager {
    ctx: Arc<ManagerContext>,
}

impl HubManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    async fn save(&self, overlay: &str, hub: &Hub) -> Result<()> {
        self.ctx
            .store
            .put(keys::HUBS, &self.store_key(overlay, hub.name()), hub)
            .await
    }

    /// Apply `change` to the stored hub under its record lock.
    pub(crate) async fn modify<F>(&self, overlay: &str, name: &str, change: F) -> Result<Hub>
    where
        F: FnOnce(&mut Hub) -> Result<bool> + Send,
    {
        self.ctx
            .modify(keys::HUBS, &self.store_key(overlay, name), EntityKind::Hub, name, change)
            .await
    }

    /// Decide the connectivity mode and resolve the hub's address.
    async fn preprocess(&self, hub: &mut Hub) -> Result<()> {
        match hub.spec.kube_config.as_deref() {
            None => {
                edge::check_gitops(&self.ctx, hub.spec.git_ops_param.as_ref()).await?;
                hub.status.mode = Some(ConnectivityMode::GitOps);
                hub.status.ip = hub.spec.public_ips.first().cloned().unwrap_or_default();
            }
            Some(encoded) => {
                if hub.spec.public_ips.is_empty() {
                    return Err(CoreError::validation(format!(
                        "hub '{}' needs at least one public IP",
                        hub.name()
                    )));
                }
                let kubeconfig = edge::parse_kubeconfig(encoded)?;
                hub.status.ip =
                    edge::resolve_public_ip(&self.ctx, &kubeconfig, &hub.spec.public_ips).await?;
                hub.status.mode = Some(ConnectivityMode::Direct);
            }
        }
        Ok(())
    }

    pub(crate) fn start_registration(&self, overlay: &str, name: &str) {
        let manager = self.clone();
        let (overlay, name) = (overlay.to_owned(), name.to_owned());
        self.ctx.registrations.start(
            RegistrationKey::new(EntityKind::Hub, &overlay, &name),
            self.ctx.config.poll_interval,
            move || {
                let manager = manager.clone();
                let (overlay, name) = (overlay.clone(), name.clone());
                async move { manager.poll_registration(&overlay, &name).await }
            },
        );
    }

    /// Restart polling for every hub of `overlay` still pending.
    pub async fn resume_registrations(&self, overlay: &str) -> Result<usize> {
        let pending: Vec<Hub> = self
            .list(overlay)
            .await?
            .into_iter()
            .filter(|h| h.status.registration == RegistrationState::Pending)
            .collect();
        for hub in &pending {
            self.start_registration(overlay, hub.name());
        }
        Ok(pending.len())
    }

    /// One registration attempt. Storage failures keep the hub pending.
    pub async fn poll_registration(&self, overlay: &str, name: &str) -> PollOutcome {
        match self.try_poll(overlay, name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(overlay, hub = name, error = %e, "registration poll failed");
                PollOutcome::Pending
            }
        }
    }

    async fn try_poll(&self, overlay: &str, name: &str) -> Result<PollOutcome> {
        let Some(hub) = self
            .ctx
            .store
            .get::<Hub>(keys::HUBS, &self.store_key(overlay, name))
            .await?
        else {
            return Ok(PollOutcome::Finished);
        };
        if hub.status.registration != RegistrationState::Pending {
            return Ok(PollOutcome::Finished);
        }

        match self.complete(overlay, &hub).await {
            Ok(()) => {
                let hub = self
                    .modify(overlay, name, |stored| {
                        stored.status.registration = RegistrationState::Success;
                        stored.status.registered_at = Some(Utc::now());
                        stored.status.message = None;
                        stored.status.cert_name = ClusterType::Hub.cert_name(name);
                        Ok(true)
                    })
                    .await?;
                info!(overlay, hub = name, ip = %hub.status.ip, "hub registered");
                self.mesh_with_hubs(overlay, &hub).await;
                Ok(PollOutcome::Finished)
            }
            Err(e) if e.is_unauthorized() => {
                self.modify(overlay, name, |stored| {
                    stored.status.registration = RegistrationState::Failed;
                    stored.status.message = Some(e.to_string());
                    Ok(true)
                })
                .await?;
                warn!(overlay, hub = name, error = %e, "hub registration failed");
                Ok(PollOutcome::Finished)
            }
            Err(e) => {
                debug!(overlay, hub = name, error = %e, "hub not ready yet");
                let message = e.to_string();
                if hub.status.message.as_deref() != Some(message.as_str()) {
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

    async fn complete(&self, overlay: &str, hub: &Hub) -> Result<()> {
        let mode = hub
            .status
            .mode
            .ok_or_else(|| CoreError::Internal(format!("hub '{}' has no mode", hub.name())))?;
        edge::register(
            &self.ctx,
            &ClusterId::for_entity(overlay, EntityKind::Hub, hub.name()),
            mode,
            hub.spec.kube_config.as_deref(),
            &hub.status.ip,
            hub.spec.git_ops_param.as_ref(),
        )
        .await?;
        self.ctx
            .certs
            .get_or_create(overlay, hub.name(), ClusterType::Hub, false)
            .await?;
        Ok(())
    }

    /// Connect a freshly registered hub to every other registered hub.
    /// Links left in `Error` or `Undeployed` are driven again.
    async fn mesh_with_hubs(&self, overlay: &str, hub: &Hub) {
        if hub.status.ip.is_empty() {
            return;
        }
        let peers = match self.list(overlay).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(overlay, hub = %hub.name(), error = %e, "cannot list peer hubs");
                return;
            }
        };
        let connections = ConnectionManager::new(self.ctx.clone());
        let own_end = end_name(EntityKind::Hub, hub.name());

        for peer in peers {
            if peer.name() == hub.name()
                || peer.status.registration != RegistrationState::Success
                || peer.status.ip.is_empty()
            {
                continue;
            }
            let peer_end = end_name(EntityKind::Hub, peer.name());
            match connections.get(overlay, &own_end, &peer_end).await {
                Ok(Some(existing)) if !existing.state.can_redeploy() => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(overlay, error = %e, "connection lookup failed");
                    continue;
                }
            }
            let result = async {
                let a = ConnectionEnd::new(EndpointOwner::Hub(hub.clone()))?;
                let b = ConnectionEnd::new(EndpointOwner::Hub(peer.clone()))?;
                connections.connect(overlay, a, b, TopologyKind::HubToHub).await
            }
            .await;
            if let Err(e) = result {
                warn!(overlay, hub = %hub.name(), peer = %peer.name(), error = %e, "hub mesh link failed");
            }
        }
    }
}

#[async_trait]
impl EntityManager for HubManager {
    type Entity = Hub;
    type Parent = str;

    fn kind(&self) -> EntityKind {
        EntityKind::Hub
    }

    fn store_key(&self, overlay: &str, name: &str) -> StoreKey {
        keys::child(overlay, "hub", name)
    }

    /// Resolve the hub's mode and address, store it as pending and start
    /// background registration.
    async fn create(&self, overlay: &str, mut hub: Hub) -> Result<Hub> {
        self.ctx.require_overlay(overlay).await?;
        validate_name(self.kind(), hub.name())?;
        if self
            .ctx
            .store
            .exists(keys::HUBS, &self.store_key(overlay, hub.name()))
            .await?
        {
            return Err(ManagerContext::already_exists(self.kind(), hub.name()));
        }

        hub.status = HubStatus::default();
        self.preprocess(&mut hub).await?;
        self.save(overlay, &hub).await?;
        self.start_registration(overlay, hub.name());
        info!(
            overlay,
            hub = %hub.name(),
            mode = ?hub.status.mode,
            ip = %hub.status.ip,
            "hub created"
        );
        Ok(hub)
    }

    async fn get(&self, overlay: &str, name: &str) -> Result<Hub> {
        self.ctx
            .load(keys::HUBS, &self.store_key(overlay, name), self.kind(), name)
            .await
    }

    async fn list(&self, overlay: &str) -> Result<Vec<Hub>> {
        self.ctx
            .store
            .list(keys::HUBS, &self.store_key(overlay, ""))
            .await
    }

    /// Only the description can change; connectivity is fixed at creation.
    async fn update(&self, overlay: &str, name: &str, hub: Hub) -> Result<Hub> {
        self.modify(overlay, name, |current| {
            if hub.name() != name || hub.spec != current.spec {
                return Err(CoreError::validation(format!(
                    "hub '{name}' can only change its description; delete and re-create it"
                )));
            }
            current.metadata.description = hub.metadata.description;
            Ok(true)
        })
        .await
    }

    /// Stop registration, tear down every connection, then remove the
    /// certificate, the cluster registration and the record.
    async fn delete(&self, overlay: &str, name: &str) -> Result<()> {
        self.ctx
            .registrations
            .cancel(&RegistrationKey::new(EntityKind::Hub, overlay, name))
            .await;
        let key = self.store_key(overlay, name);
        if !self.ctx.store.exists(keys::HUBS, &key).await? {
            return Ok(());
        }

        ConnectionManager::new(self.ctx.clone())
            .disconnect_all(overlay, &end_name(EntityKind::Hub, name))
            .await?;
        self.ctx
            .certs
            .delete_by_type(overlay, name, ClusterType::Hub)
            .await?;
        self.ctx
            .registry
            .unregister_cluster(&ClusterId::for_entity(overlay, EntityKind::Hub, name))
            .await?;
        self.ctx.store.delete(keys::HUBS, &key).await?;
        self.ctx.forget_record_lock(keys::HUBS, &key);
        info!(overlay, hub = name, "hub deleted");
        Ok(())
    }
}
