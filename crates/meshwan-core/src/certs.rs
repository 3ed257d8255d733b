// ── Certificate orchestration ──
//
// Trust hierarchy: a self-signed root issuer signs one CA certificate per
// overlay; each overlay CA backs an overlay issuer that signs hub and
// device certificates. Every object lives in one namespace.
//
// All issuance is create-if-absent, so every call here is safe to retry.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use meshwan_api::IssuerClient;
use meshwan_api::issuer::models::{CertificateSpec as WireCertificate, IssuerSpec};

use crate::config::OrchestratorConfig;
use crate::error::{CoreError, Result};
use crate::model::{CertificateData, ClusterType};

/// Separator between PEM blocks in an assembled chain.
pub const CHAIN_SEPARATOR: &str = "___";

// ── Collaborator seam ────────────────────────────────────────────────

#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()>;

    async fn create_self_signed_issuer(&self, namespace: &str, name: &str) -> Result<()>;

    /// Issuer signing with the key pair stored in `ca_secret`.
    async fn create_ca_issuer(&self, namespace: &str, name: &str, ca_secret: &str) -> Result<()>;

    /// Issue `name` from `issuer` unless it already exists.
    async fn create_certificate(
        &self,
        namespace: &str,
        name: &str,
        issuer: &str,
        is_ca: bool,
    ) -> Result<()>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<CertificateData>;

    async fn delete_certificate(&self, namespace: &str, name: &str) -> Result<()>;

    async fn delete_issuer(&self, namespace: &str, name: &str) -> Result<()>;
}

#[async_trait]
impl CertificateIssuer for IssuerClient {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        Ok(IssuerClient::ensure_namespace(self, namespace).await?)
    }

    async fn create_self_signed_issuer(&self, namespace: &str, name: &str) -> Result<()> {
        Ok(self
            .create_issuer(namespace, name, &IssuerSpec::SelfSigned {})
            .await?)
    }

    async fn create_ca_issuer(&self, namespace: &str, name: &str, ca_secret: &str) -> Result<()> {
        let spec = IssuerSpec::Ca {
            secret_name: ca_secret.to_owned(),
        };
        Ok(self.create_issuer(namespace, name, &spec).await?)
    }

    async fn create_certificate(
        &self,
        namespace: &str,
        name: &str,
        issuer: &str,
        is_ca: bool,
    ) -> Result<()> {
        let spec = WireCertificate {
            common_name: name.to_owned(),
            is_ca,
            issuer_ref: issuer.to_owned(),
            secret_name: name.to_owned(),
        };
        Ok(IssuerClient::create_certificate(self, namespace, name, &spec).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<CertificateData> {
        let secret = IssuerClient::get_secret(self, namespace, name).await?;
        Ok(CertificateData {
            ca: secret.ca,
            cert: secret.cert,
            key: secret.key,
        })
    }

    async fn delete_certificate(&self, namespace: &str, name: &str) -> Result<()> {
        match IssuerClient::delete_certificate(self, namespace, name).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => Ok(other?),
        }
    }

    async fn delete_issuer(&self, namespace: &str, name: &str) -> Result<()> {
        match IssuerClient::delete_issuer(self, namespace, name).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => Ok(other?),
        }
    }
}

// ── Chain selection ──────────────────────────────────────────────────

/// Which certificates to append after the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainSelector {
    pub overlay: Option<String>,
    pub hub: Option<String>,
    pub device: Option<String>,
}

// ── Orchestrator ─────────────────────────────────────────────────────

pub struct CertificateOrchestrator {
    issuer: Arc<dyn CertificateIssuer>,
    namespace: String,
    root_issuer: String,
    root_cert: String,
    root_ready: OnceCell<()>,
}

impl CertificateOrchestrator {
    pub fn new(issuer: Arc<dyn CertificateIssuer>, config: &OrchestratorConfig) -> Self {
        Self {
            issuer,
            namespace: config.cert_namespace.clone(),
            root_issuer: config.root_issuer.clone(),
            root_cert: config.root_cert.clone(),
            root_ready: OnceCell::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn issuer_name(overlay: &str) -> String {
        format!("{overlay}-issuer")
    }

    async fn ensure_root(&self) -> Result<()> {
        self.root_ready
            .get_or_try_init(|| async {
                info!(namespace = %self.namespace, issuer = %self.root_issuer, "provisioning root CA");
                self.issuer.ensure_namespace(&self.namespace).await?;
                self.issuer
                    .create_self_signed_issuer(&self.namespace, &self.root_issuer)
                    .await?;
                self.issuer
                    .create_certificate(&self.namespace, &self.root_cert, &self.root_issuer, true)
                    .await
            })
            .await
            .map(|_| ())
            .map_err(|e| self.cert_error(&self.root_cert, &e))
    }

    /// Issue (if absent) and fetch the certificate of `entity`.
    ///
    /// Overlay certificates are CAs signed by the root; creating one also
    /// creates the overlay's issuer. Everything else is signed by the
    /// overlay issuer.
    pub async fn get_or_create(
        &self,
        overlay: &str,
        entity: &str,
        cluster_type: ClusterType,
        is_ca: bool,
    ) -> Result<CertificateData> {
        self.ensure_root().await?;
        let name = cluster_type.cert_name(entity);
        let ns = &self.namespace;

        let issued = async {
            match cluster_type {
                ClusterType::Overlay => {
                    self.issuer
                        .create_certificate(ns, &name, &self.root_issuer, true)
                        .await?;
                    self.issuer
                        .create_ca_issuer(ns, &Self::issuer_name(entity), &name)
                        .await?;
                }
                ClusterType::Hub | ClusterType::Device => {
                    self.issuer
                        .create_certificate(ns, &name, &Self::issuer_name(overlay), is_ca)
                        .await?;
                }
            }
            self.issuer.get_secret(ns, &name).await
        }
        .await;

        let data = issued.map_err(|e| self.cert_error(&name, &e))?;
        debug!(overlay, certificate = %name, "certificate ready");
        Ok(data)
    }

    /// Remove the certificate of `entity` (and, for overlays, its issuer).
    pub async fn delete_by_type(
        &self,
        overlay: &str,
        entity: &str,
        cluster_type: ClusterType,
    ) -> Result<()> {
        let name = cluster_type.cert_name(entity);
        debug!(overlay, certificate = %name, "deleting certificate");
        let ns = &self.namespace;
        let removed = async {
            if cluster_type == ClusterType::Overlay {
                self.issuer
                    .delete_issuer(ns, &Self::issuer_name(entity))
                    .await?;
            }
            self.issuer.delete_certificate(ns, &name).await
        }
        .await;
        removed.map_err(|e| self.cert_error(&name, &e))
    }

    /// Root certificate followed by the selected ones, in the fixed
    /// order overlay, device, hub.
    pub async fn get_chain(&self, selector: &ChainSelector) -> Result<String> {
        self.ensure_root().await?;

        let mut names = vec![self.root_cert.clone()];
        if let Some(overlay) = &selector.overlay {
            names.push(ClusterType::Overlay.cert_name(overlay));
        }
        if let Some(device) = &selector.device {
            names.push(ClusterType::Device.cert_name(device));
        }
        if let Some(hub) = &selector.hub {
            names.push(ClusterType::Hub.cert_name(hub));
        }

        let mut chain = Vec::with_capacity(names.len());
        for name in &names {
            let secret = self
                .issuer
                .get_secret(&self.namespace, name)
                .await
                .map_err(|e| self.cert_error(name, &e))?;
            chain.push(secret.cert);
        }
        Ok(chain.join(CHAIN_SEPARATOR))
    }

    fn cert_error(&self, name: &str, err: &CoreError) -> CoreError {
        CoreError::Certificate {
            name: name.to_owned(),
            message: format!("{err} (namespace {})", self.namespace),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::FakeIssuer;

    fn orchestrator() -> (Arc<FakeIssuer>, CertificateOrchestrator) {
        let issuer = Arc::new(FakeIssuer::default());
        let certs = CertificateOrchestrator::new(issuer.clone(), &OrchestratorConfig::default());
        (issuer, certs)
    }

    #[tokio::test]
    async fn hub_chain_is_root_then_hub() {
        let (_, certs) = orchestrator();
        certs.get_or_create("ov1", "ov1", ClusterType::Overlay, true).await.unwrap();
        certs.get_or_create("ov1", "h1", ClusterType::Hub, false).await.unwrap();

        let chain = certs
            .get_chain(&ChainSelector {
                hub: Some("h1".into()),
                ..ChainSelector::default()
            })
            .await
            .unwrap();
        assert_eq!(chain, "cert:meshwan-root-cert___cert:hub-h1-cert");
    }

    #[tokio::test]
    async fn chain_order_is_root_overlay_device_hub() {
        let (_, certs) = orchestrator();
        certs.get_or_create("ov1", "ov1", ClusterType::Overlay, true).await.unwrap();
        certs.get_or_create("ov1", "h1", ClusterType::Hub, false).await.unwrap();
        certs.get_or_create("ov1", "d1", ClusterType::Device, false).await.unwrap();

        let chain = certs
            .get_chain(&ChainSelector {
                overlay: Some("ov1".into()),
                hub: Some("h1".into()),
                device: Some("d1".into()),
            })
            .await
            .unwrap();
        let parts: Vec<&str> = chain.split(CHAIN_SEPARATOR).collect();
        assert_eq!(
            parts,
            vec![
                "cert:meshwan-root-cert",
                "cert:ov1-cert",
                "cert:device-d1-cert",
                "cert:hub-h1-cert"
            ]
        );
    }

    #[tokio::test]
    async fn overlay_ca_backs_device_certificates() {
        let (issuer, certs) = orchestrator();
        certs.get_or_create("ov1", "ov1", ClusterType::Overlay, true).await.unwrap();
        let data = certs
            .get_or_create("ov1", "d1", ClusterType::Device, false)
            .await
            .unwrap();

        assert_eq!(data.cert, "cert:device-d1-cert");
        assert_eq!(data.ca, "cert:ov1-cert");
        assert_eq!(issuer.issuer_of("device-d1-cert").as_deref(), Some("ov1-issuer"));
        assert_eq!(issuer.issuer_of("ov1-cert").as_deref(), Some("meshwan-root-issuer"));
    }

    #[tokio::test]
    async fn issuance_is_create_if_absent() {
        let (issuer, certs) = orchestrator();
        certs.get_or_create("ov1", "ov1", ClusterType::Overlay, true).await.unwrap();
        let first = certs.get_or_create("ov1", "h1", ClusterType::Hub, false).await.unwrap();
        let again = certs.get_or_create("ov1", "h1", ClusterType::Hub, false).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(issuer.certificate_count(), 3);
    }

    #[tokio::test]
    async fn issuer_failure_aborts() {
        let (issuer, certs) = orchestrator();
        issuer.fail_with("issuer offline");
        let err = certs
            .get_or_create("ov1", "h1", ClusterType::Hub, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Certificate { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn delete_overlay_removes_issuer_too() {
        let (issuer, certs) = orchestrator();
        certs.get_or_create("ov1", "ov1", ClusterType::Overlay, true).await.unwrap();
        certs.delete_by_type("ov1", "ov1", ClusterType::Overlay).await.unwrap();
        assert!(issuer.issuer_of("ov1-cert").is_none());
        assert!(!issuer.has_issuer("ov1-issuer"));
    }
}
