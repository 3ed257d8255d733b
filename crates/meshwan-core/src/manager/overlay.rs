use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::EntityManager;
use super::context::ManagerContext;
use crate::certs::CertificateOrchestrator;
use crate::error::{CoreError, Result};
use crate::model::{ClusterType, EntityKind, Overlay, validate_name};
use crate::store::{StoreKey, keys};

#[derive(Clone)]
pub struct OverlayManager {
    ctx: Arc<ManagerContext>,
}

impl OverlayManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    /// Collections that must be empty before an overlay can go.
    async fn ensure_empty(&self, name: &str) -> Result<()> {
        let children = [
            (keys::PROPOSALS, "proposal"),
            (keys::IP_RANGES, "iprange"),
            (keys::HUBS, "hub"),
            (keys::DEVICES, "device"),
            (keys::CERTIFICATES, "certificate"),
        ];
        for (collection, field) in children {
            let found: Vec<serde_json::Value> = self
                .ctx
                .store
                .list(collection, &keys::child(name, field, ""))
                .await?;
            if !found.is_empty() {
                return Err(CoreError::Conflict {
                    message: format!(
                        "overlay '{name}' still has {} {collection}",
                        found.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EntityManager for OverlayManager {
    type Entity = Overlay;
    type Parent = ();

    fn kind(&self) -> EntityKind {
        EntityKind::Overlay
    }

    fn store_key(&self, _parent: &(), name: &str) -> StoreKey {
        keys::overlay(name)
    }

    async fn create(&self, _parent: &(), mut overlay: Overlay) -> Result<Overlay> {
        let name = overlay.metadata.name.clone();
        validate_name(self.kind(), &name)?;
        if self.ctx.store.exists(keys::OVERLAYS, &self.store_key(&(), &name)).await? {
            return Err(ManagerContext::already_exists(self.kind(), &name));
        }

        // The overlay CA and its issuer back every hub and device cert.
        self.ctx
            .certs
            .get_or_create(&name, &name, ClusterType::Overlay, true)
            .await?;
        overlay.status.cert_name = ClusterType::Overlay.cert_name(&name);
        overlay.status.issuer_name = CertificateOrchestrator::issuer_name(&name);

        self.ctx
            .store
            .put(keys::OVERLAYS, &self.store_key(&(), &name), &overlay)
            .await?;
        info!(overlay = %name, "overlay created");
        Ok(overlay)
    }

    async fn get(&self, _parent: &(), name: &str) -> Result<Overlay> {
        self.ctx.require_overlay(name).await
    }

    async fn list(&self, _parent: &()) -> Result<Vec<Overlay>> {
        self.ctx.store.list(keys::OVERLAYS, &keys::overlay("")).await
    }

    async fn update(&self, _parent: &(), name: &str, overlay: Overlay) -> Result<Overlay> {
        if overlay.metadata.name != name {
            return Err(CoreError::validation(format!(
                "name '{}' does not match '{name}'",
                overlay.metadata.name
            )));
        }
        let mut current = self.ctx.require_overlay(name).await?;
        current.metadata.description = overlay.metadata.description;
        self.ctx
            .store
            .put(keys::OVERLAYS, &self.store_key(&(), name), &current)
            .await?;
        Ok(current)
    }

    async fn delete(&self, _parent: &(), name: &str) -> Result<()> {
        let key = self.store_key(&(), name);
        if !self.ctx.store.exists(keys::OVERLAYS, &key).await? {
            return Ok(());
        }
        self.ensure_empty(name).await?;

        self.ctx
            .certs
            .delete_by_type(name, name, ClusterType::Overlay)
            .await?;
        self.ctx.store.delete(keys::OVERLAYS, &key).await?;
        self.ctx.forget_overlay_lock(name);
        info!(overlay = %name, "overlay deleted");
        Ok(())
    }
}
