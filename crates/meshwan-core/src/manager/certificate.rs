use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::EntityManager;
use super::context::ManagerContext;
use crate::certs::ChainSelector;
use crate::error::{CoreError, Result};
use crate::model::{CertificateObject, EntityKind, validate_name};
use crate::store::{StoreKey, keys};

/// User-requested certificates. Only the request is stored; the key
/// material is fetched from the issuer on every read.
#[derive(Clone)]
pub struct CertificateManager {
    ctx: Arc<ManagerContext>,
}

impl CertificateManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    async fn with_data(&self, overlay: &str, mut cert: CertificateObject) -> Result<CertificateObject> {
        let data = self
            .ctx
            .certs
            .get_or_create(overlay, &cert.metadata.name, cert.spec.cluster_type, cert.spec.is_ca)
            .await?;
        cert.data = Some(data);
        Ok(cert)
    }

    /// Root certificate followed by the selected overlay, device and hub
    /// certificates, joined with `___`.
    pub async fn chain(&self, selector: &ChainSelector) -> Result<String> {
        self.ctx.certs.get_chain(selector).await
    }
}

#[async_trait]
impl EntityManager for CertificateManager {
    type Entity = CertificateObject;
    type Parent = str;

    fn kind(&self) -> EntityKind {
        EntityKind::Certificate
    }

    fn store_key(&self, overlay: &str, name: &str) -> StoreKey {
        keys::child(overlay, "certificate", name)
    }

    async fn create(&self, overlay: &str, mut cert: CertificateObject) -> Result<CertificateObject> {
        self.ctx.require_overlay(overlay).await?;
        let name = cert.metadata.name.clone();
        validate_name(self.kind(), &name)?;
        let key = self.store_key(overlay, &name);
        if self.ctx.store.exists(keys::CERTIFICATES, &key).await? {
            return Err(ManagerContext::already_exists(self.kind(), &name));
        }

        cert.data = None;
        let issued = self.with_data(overlay, cert.clone()).await?;
        self.ctx.store.put(keys::CERTIFICATES, &key, &cert).await?;
        info!(overlay, certificate = %name, cluster_type = %cert.spec.cluster_type, "certificate issued");
        Ok(issued)
    }

    async fn get(&self, overlay: &str, name: &str) -> Result<CertificateObject> {
        let cert = self
            .ctx
            .load(keys::CERTIFICATES, &self.store_key(overlay, name), self.kind(), name)
            .await?;
        self.with_data(overlay, cert).await
    }

    /// Listed without key material.
    async fn list(&self, overlay: &str) -> Result<Vec<CertificateObject>> {
        self.ctx
            .store
            .list(keys::CERTIFICATES, &self.store_key(overlay, ""))
            .await
    }

    async fn update(
        &self,
        overlay: &str,
        name: &str,
        cert: CertificateObject,
    ) -> Result<CertificateObject> {
        let mut current: CertificateObject = self
            .ctx
            .load(keys::CERTIFICATES, &self.store_key(overlay, name), self.kind(), name)
            .await?;
        if cert.metadata.name != name || cert.spec != current.spec {
            return Err(CoreError::validation(format!(
                "certificate '{name}' can only change its description"
            )));
        }
        current.metadata.description = cert.metadata.description;
        self.ctx
            .store
            .put(keys::CERTIFICATES, &self.store_key(overlay, name), &current)
            .await?;
        self.with_data(overlay, current).await
    }

    async fn delete(&self, overlay: &str, name: &str) -> Result<()> {
        let key = self.store_key(overlay, name);
        let Some(cert) = self
            .ctx
            .store
            .get::<CertificateObject>(keys::CERTIFICATES, &key)
            .await?
        else {
            return Ok(());
        };
        self.ctx
            .certs
            .delete_by_type(overlay, name, cert.spec.cluster_type)
            .await?;
        self.ctx.store.delete(keys::CERTIFICATES, &key).await
    }
}
