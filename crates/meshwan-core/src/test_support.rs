// In-memory collaborators for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use meshwan_api::KubeConfig;
use meshwan_api::sync::models::{
    AppContextStatus, ClusterRegistration, DeploymentUnit, InstallResponse, ResourceAction,
    ResourceSpec, UninstallResponse,
};

use crate::certs::CertificateIssuer;
use crate::config::OrchestratorConfig;
use crate::deploy::{ClusterId, ResourceSync};
use crate::error::{CoreError, Result};
use crate::manager::Collaborators;
use crate::model::CertificateData;
use crate::orchestrator::Orchestrator;
use crate::registration::{ClusterRegistry, Prober};
use crate::store::MemoryStore;

fn unavailable(message: &str) -> CoreError {
    CoreError::Api {
        message: message.to_owned(),
        code: None,
        status: Some(503),
    }
}

// ── Issuer ──────────────────────────────────────────────────────────

#[derive(Default)]
struct IssuerState {
    /// Certificate -> issuer.
    certificates: BTreeMap<String, String>,
    /// Issuer -> CA secret (`None` for self-signed).
    issuers: BTreeMap<String, Option<String>>,
    failure: Option<String>,
}

/// Certificates are `cert:<name>`, keys `key:<name>`. The CA of a
/// certificate is the CA secret of its issuer, or itself when self-signed.
#[derive(Default)]
pub struct FakeIssuer {
    state: Mutex<IssuerState>,
}

impl FakeIssuer {
    pub fn issuer_of(&self, certificate: &str) -> Option<String> {
        self.state.lock().unwrap().certificates.get(certificate).cloned()
    }

    pub fn has_issuer(&self, name: &str) -> bool {
        self.state.lock().unwrap().issuers.contains_key(name)
    }

    pub fn certificate_count(&self) -> usize {
        self.state.lock().unwrap().certificates.len()
    }

    pub fn fail_with(&self, message: &str) {
        self.state.lock().unwrap().failure = Some(message.to_owned());
    }

    fn check(&self) -> Result<()> {
        match &self.state.lock().unwrap().failure {
            Some(message) => Err(unavailable(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CertificateIssuer for FakeIssuer {
    async fn ensure_namespace(&self, _namespace: &str) -> Result<()> {
        self.check()
    }

    async fn create_self_signed_issuer(&self, _namespace: &str, name: &str) -> Result<()> {
        self.check()?;
        self.state.lock().unwrap().issuers.entry(name.to_owned()).or_insert(None);
        Ok(())
    }

    async fn create_ca_issuer(&self, _namespace: &str, name: &str, ca_secret: &str) -> Result<()> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .issuers
            .entry(name.to_owned())
            .or_insert_with(|| Some(ca_secret.to_owned()));
        Ok(())
    }

    async fn create_certificate(
        &self,
        _namespace: &str,
        name: &str,
        issuer: &str,
        _is_ca: bool,
    ) -> Result<()> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .certificates
            .entry(name.to_owned())
            .or_insert_with(|| issuer.to_owned());
        Ok(())
    }

    async fn get_secret(&self, _namespace: &str, name: &str) -> Result<CertificateData> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let issuer = state.certificates.get(name).ok_or_else(|| CoreError::Api {
            message: format!("secret {name} not found"),
            code: None,
            status: Some(404),
        })?;
        let ca = match state.issuers.get(issuer) {
            Some(Some(secret)) => secret.clone(),
            _ => name.to_owned(),
        };
        Ok(CertificateData {
            ca: format!("cert:{ca}"),
            cert: format!("cert:{name}"),
            key: format!("key:{name}"),
        })
    }

    async fn delete_certificate(&self, _namespace: &str, name: &str) -> Result<()> {
        self.check()?;
        self.state.lock().unwrap().certificates.remove(name);
        Ok(())
    }

    async fn delete_issuer(&self, _namespace: &str, name: &str) -> Result<()> {
        self.check()?;
        self.state.lock().unwrap().issuers.remove(name);
        Ok(())
    }
}

// ── Sync service ─────────────────────────────────────────────────────

#[derive(Default)]
struct SyncState {
    units: BTreeMap<String, DeploymentUnit>,
    installed: Vec<String>,
    uninstalled: Vec<String>,
    reject: Option<String>,
    hang: bool,
}

#[derive(Default)]
pub struct FakeSync {
    state: Mutex<SyncState>,
}

impl FakeSync {
    pub fn unit(&self, id: &str) -> Option<DeploymentUnit> {
        self.state.lock().unwrap().units.get(id).cloned()
    }

    pub fn unit_count(&self) -> usize {
        self.state.lock().unwrap().units.len()
    }

    pub fn uninstalled(&self) -> Vec<String> {
        self.state.lock().unwrap().uninstalled.clone()
    }

    pub fn reject_installs(&self, message: &str) {
        self.state.lock().unwrap().reject = Some(message.to_owned());
    }

    pub fn accept_installs(&self) {
        self.state.lock().unwrap().reject = None;
    }

    pub fn hang_installs(&self) {
        self.state.lock().unwrap().hang = true;
    }

    /// Resources of every installed (or, with `removed`, uninstalled) unit
    /// destined for `cluster`.
    fn resources(&self, cluster: &ClusterId, removed: bool) -> Vec<ResourceSpec> {
        let state = self.state.lock().unwrap();
        let ids = if removed { &state.uninstalled } else { &state.installed };
        let cluster = cluster.to_string();
        ids.iter()
            .filter_map(|id| state.units.get(id))
            .flat_map(|unit| unit.apps.iter())
            .filter(|app| app.cluster == cluster)
            .flat_map(|app| app.resources.iter().cloned())
            .collect()
    }

    pub fn installed_on(&self, cluster: &ClusterId) -> Vec<ResourceSpec> {
        self.resources(cluster, false)
    }

    pub fn removed_from(&self, cluster: &ClusterId) -> Vec<ResourceSpec> {
        self.resources(cluster, true)
            .into_iter()
            .filter(|r| r.action == ResourceAction::Delete)
            .collect()
    }
}

#[async_trait]
impl ResourceSync for FakeSync {
    async fn create_app_context(&self, unit: &DeploymentUnit) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .units
            .insert(unit.id.clone(), unit.clone());
        Ok(())
    }

    async fn install_app(&self, id: &str) -> Result<InstallResponse> {
        let (hang, reject) = {
            let state = self.state.lock().unwrap();
            (state.hang, state.reject.clone())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(message) = reject {
            return Ok(InstallResponse {
                installed: false,
                message,
            });
        }
        self.state.lock().unwrap().installed.push(id.to_owned());
        Ok(InstallResponse {
            installed: true,
            message: String::new(),
        })
    }

    async fn uninstall_app(&self, id: &str) -> Result<UninstallResponse> {
        self.state.lock().unwrap().uninstalled.push(id.to_owned());
        Ok(UninstallResponse {
            uninstalled: true,
            message: String::new(),
        })
    }

    async fn read_app_context(&self, id: &str) -> Result<AppContextStatus> {
        let known = self.state.lock().unwrap().units.contains_key(id);
        if !known {
            return Err(CoreError::Api {
                message: format!("app context {id} not found"),
                code: None,
                status: Some(404),
            });
        }
        Ok(AppContextStatus {
            id: id.to_owned(),
            state: "Instantiated".into(),
            message: None,
        })
    }
}

// ── Registry ─────────────────────────────────────────────────────────

#[derive(Default)]
struct RegistryState {
    registered: Vec<ClusterRegistration>,
    unregistered: Vec<String>,
    gitops_objects: BTreeSet<(String, String)>,
}

#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<RegistryState>,
}

impl FakeRegistry {
    pub fn add_gitops_object(&self, git_ops_type: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .gitops_objects
            .insert((git_ops_type.to_owned(), name.to_owned()));
    }

    pub fn registered(&self) -> Vec<ClusterRegistration> {
        self.state.lock().unwrap().registered.clone()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.state.lock().unwrap().unregistered.clone()
    }
}

#[async_trait]
impl ClusterRegistry for FakeRegistry {
    async fn register_cluster(&self, registration: &ClusterRegistration) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .registered
            .push(registration.clone());
        Ok(())
    }

    async fn unregister_cluster(&self, cluster: &ClusterId) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .unregistered
            .push(cluster.to_string());
        Ok(())
    }

    async fn gitops_object_exists(&self, git_ops_type: &str, name: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .gitops_objects
            .contains(&(git_ops_type.to_owned(), name.to_owned())))
    }
}

// ── Prober ───────────────────────────────────────────────────────────

#[derive(Default)]
struct ProberState {
    reachable: BTreeSet<String>,
    unauthorized: BTreeSet<String>,
    calls: Vec<String>,
}

/// Every IP is unreachable until marked otherwise.
#[derive(Default)]
pub struct FakeProber {
    state: Mutex<ProberState>,
}

impl FakeProber {
    pub fn make_reachable(&self, ip: &str) {
        self.state.lock().unwrap().reachable.insert(ip.to_owned());
    }

    pub fn make_unreachable(&self, ip: &str) {
        self.state.lock().unwrap().reachable.remove(ip);
    }

    pub fn reject_credentials(&self, ip: &str) {
        self.state.lock().unwrap().unauthorized.insert(ip.to_owned());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, _kubeconfig: &KubeConfig, ip: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ip.to_owned());
        if state.unauthorized.contains(ip) {
            return Err(CoreError::Unauthorized {
                message: format!("{ip} rejected the token"),
            });
        }
        if state.reachable.contains(ip) {
            Ok(())
        } else {
            Err(CoreError::Unreachable {
                target: ip.to_owned(),
                reason: "connection refused".into(),
            })
        }
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub const KUBECONFIG: &str = r"
apiVersion: v1
kind: Config
clusters:
- name: edge
  cluster:
    server: https://192.0.2.10:6443
users:
- name: admin
  user:
    token: abc123
contexts:
- name: edge-admin
  context:
    cluster: edge
    user: admin
current-context: edge-admin
";

pub fn kubeconfig_b64() -> String {
    STANDARD.encode(KUBECONFIG)
}

/// An orchestrator wired to fakes, with a one-second poll interval.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub issuer: Arc<FakeIssuer>,
    pub sync: Arc<FakeSync>,
    pub registry: Arc<FakeRegistry>,
    pub prober: Arc<FakeProber>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        let issuer = Arc::new(FakeIssuer::default());
        let sync = Arc::new(FakeSync::default());
        let registry = Arc::new(FakeRegistry::default());
        let prober = Arc::new(FakeProber::default());
        let store = Arc::new(MemoryStore::new());
        let config = OrchestratorConfig {
            poll_interval: Duration::from_secs(1),
            ..OrchestratorConfig::default()
        };
        let orchestrator = Orchestrator::new(
            config,
            store.clone(),
            Collaborators {
                issuer: issuer.clone(),
                sync: sync.clone(),
                registry: registry.clone(),
                prober: prober.clone(),
            },
        );
        Self {
            orchestrator,
            issuer,
            sync,
            registry,
            prober,
            store,
        }
    }
}
