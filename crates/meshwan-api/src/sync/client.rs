// HTTP client for the resource-synchronization service.
//
// Base path: /v1/
// Auth: bearer token
//
// App contexts are keyed by the deployment id chosen by the caller:
// the unit is uploaded first, then installed or uninstalled by id.

use secrecy::SecretString;
use tracing::debug;

use super::models::{
    AppContextStatus, ClusterRegistration, DeploymentUnit, InstallResponse, UninstallResponse,
};
use crate::error::Error;
use crate::rest::RestClient;
use crate::transport::TransportConfig;

/// Async client for the resource-synchronization service.
#[derive(Debug, Clone)]
pub struct SyncClient {
    rest: RestClient,
}

impl SyncClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a base URL, optional bearer token and transport config.
    pub fn new(
        base_url: &str,
        token: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client_with_token(token)?;
        Ok(Self {
            rest: RestClient::new(http, base_url)?,
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            rest: RestClient::new(http, base_url)?,
        })
    }

    pub fn base_url(&self) -> &url::Url {
        self.rest.base_url()
    }

    // ── App contexts ─────────────────────────────────────────────────

    /// Upload a deployment unit under its id.
    ///
    /// `PUT /v1/appcontexts/{id}`
    pub async fn create_app_context(&self, unit: &DeploymentUnit) -> Result<(), Error> {
        debug!(id = %unit.id, name = %unit.name, apps = unit.apps.len(), "uploading deployment unit");
        self.rest
            .put_no_response(&format!("v1/appcontexts/{}", unit.id), unit)
            .await
    }

    /// `POST /v1/appcontexts/{id}/install`
    pub async fn install_app(&self, id: &str) -> Result<InstallResponse, Error> {
        self.rest
            .post(&format!("v1/appcontexts/{id}/install"), &serde_json::json!({}))
            .await
    }

    /// `POST /v1/appcontexts/{id}/uninstall`
    pub async fn uninstall_app(&self, id: &str) -> Result<UninstallResponse, Error> {
        self.rest
            .post(
                &format!("v1/appcontexts/{id}/uninstall"),
                &serde_json::json!({}),
            )
            .await
    }

    /// `GET /v1/appcontexts/{id}`
    pub async fn read_app_context(&self, id: &str) -> Result<AppContextStatus, Error> {
        self.rest.get(&format!("v1/appcontexts/{id}")).await
    }

    // ── Cluster registry ─────────────────────────────────────────────

    /// Register (or re-register) a cluster.
    ///
    /// `PUT /v1/clusters/{provider}/{cluster}`
    pub async fn register_cluster(&self, registration: &ClusterRegistration) -> Result<(), Error> {
        debug!(provider = %registration.provider, cluster = %registration.cluster, "registering cluster");
        self.rest
            .put_no_response(
                &format!(
                    "v1/clusters/{}/{}",
                    registration.provider, registration.cluster
                ),
                registration,
            )
            .await
    }

    /// `DELETE /v1/clusters/{provider}/{cluster}`
    pub async fn unregister_cluster(&self, provider: &str, cluster: &str) -> Result<(), Error> {
        self.rest
            .delete(&format!("v1/clusters/{provider}/{cluster}"))
            .await
    }

    /// Whether a GitOps-managed object is known to the sync service.
    ///
    /// `GET /v1/gitops/{type}/{name}` (404 means absent)
    pub async fn gitops_object_exists(&self, git_ops_type: &str, name: &str) -> Result<bool, Error> {
        self.rest
            .head_exists(&format!("v1/gitops/{git_ops_type}/{name}"))
            .await
    }
}
