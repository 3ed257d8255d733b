// ── Resource deployment facade ──
//
// `ResUtil` collects, per target cluster, the resources a single operation
// must create or delete and submits them as one deployment unit. The unit
// is accepted or rejected as a whole; there is no retry here.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use meshwan_api::SyncClient;
use meshwan_api::sync::models::{
    AppContextStatus, AppSpec, DeploymentUnit, InstallResponse, ResourceAction, ResourceSpec,
    ResourceStatus, UninstallResponse,
};

use crate::config::OrchestratorConfig;
use crate::error::{CoreError, Result};
use crate::model::{EndpointOwner, EntityKind, ResourceDescriptor};

// ── Collaborator seam ────────────────────────────────────────────────

#[async_trait]
pub trait ResourceSync: Send + Sync {
    async fn create_app_context(&self, unit: &DeploymentUnit) -> Result<()>;
    async fn install_app(&self, id: &str) -> Result<InstallResponse>;
    async fn uninstall_app(&self, id: &str) -> Result<UninstallResponse>;
    async fn read_app_context(&self, id: &str) -> Result<AppContextStatus>;
}

#[async_trait]
impl ResourceSync for SyncClient {
    async fn create_app_context(&self, unit: &DeploymentUnit) -> Result<()> {
        Ok(SyncClient::create_app_context(self, unit).await?)
    }

    async fn install_app(&self, id: &str) -> Result<InstallResponse> {
        Ok(SyncClient::install_app(self, id).await?)
    }

    async fn uninstall_app(&self, id: &str) -> Result<UninstallResponse> {
        Ok(SyncClient::uninstall_app(self, id).await?)
    }

    async fn read_app_context(&self, id: &str) -> Result<AppContextStatus> {
        Ok(SyncClient::read_app_context(self, id).await?)
    }
}

// ── Cluster identity ─────────────────────────────────────────────────

/// A cluster as registered with the sync service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterId {
    pub provider: String,
    pub cluster: String,
}

impl ClusterId {
    /// The SCC, which terminates tunnels for proxied devices.
    pub fn scc() -> Self {
        Self {
            provider: "meshwan".into(),
            cluster: "scc".into(),
        }
    }

    pub fn for_entity(overlay: &str, kind: EntityKind, name: &str) -> Self {
        Self {
            provider: overlay.to_owned(),
            cluster: format!("{}-{name}", kind.to_string().to_lowercase()),
        }
    }

    pub fn for_owner(overlay: &str, owner: &EndpointOwner) -> Self {
        match owner {
            EndpointOwner::Overlay(_) => Self::scc(),
            other => Self::for_entity(overlay, other.entity_kind(), other.name()),
        }
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.provider, self.cluster)
    }
}

// ── ResUtil ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DeployResource {
    pub action: ResourceAction,
    pub resource: ResourceDescriptor,
}

impl DeployResource {
    fn same_as(&self, action: ResourceAction, resource: &ResourceDescriptor) -> bool {
        self.action == action
            && self.resource.name() == resource.name()
            && self.resource.kind() == resource.kind()
    }
}

pub struct ResUtil {
    sync: Arc<dyn ResourceSync>,
    install_timeout: Duration,
    uninstall_timeout: Duration,
    targets: IndexMap<String, Vec<DeployResource>>,
}

impl ResUtil {
    pub fn new(sync: Arc<dyn ResourceSync>, config: &OrchestratorConfig) -> Self {
        Self {
            sync,
            install_timeout: config.install_timeout,
            uninstall_timeout: config.uninstall_timeout,
            targets: IndexMap::new(),
        }
    }

    /// Queue `resource` for `target`. Returns `false` if an entry with the
    /// same action, name and kind was already queued.
    pub fn add_resource(
        &mut self,
        target: &ClusterId,
        action: ResourceAction,
        resource: ResourceDescriptor,
    ) -> bool {
        let queued = self.targets.entry(target.to_string()).or_default();
        if queued.iter().any(|r| r.same_as(action, &resource)) {
            return false;
        }
        queued.push(DeployResource { action, resource });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.targets.values().all(Vec::is_empty)
    }

    /// Queued resources for `target`, in insertion order.
    pub fn resources_for(&self, target: &ClusterId) -> &[DeployResource] {
        self.targets
            .get(&target.to_string())
            .map_or(&[][..], Vec::as_slice)
    }

    /// One app per target; resources keep insertion order.
    pub fn build_unit(
        &self,
        id: &str,
        name: &str,
        status: ResourceStatus,
    ) -> Result<DeploymentUnit> {
        let mut apps = Vec::with_capacity(self.targets.len());
        for (cluster, queued) in &self.targets {
            if queued.is_empty() {
                continue;
            }
            let resources = queued
                .iter()
                .map(|r| {
                    Ok(ResourceSpec {
                        name: r.resource.name().to_owned(),
                        kind: r.resource.kind().to_owned(),
                        action: r.action,
                        status,
                        content: r.resource.render()?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let order = resources.iter().map(ResourceSpec::handle).collect();
            apps.push(AppSpec {
                cluster: cluster.clone(),
                resources,
                order,
                dependency: BTreeMap::new(),
            });
        }
        Ok(DeploymentUnit {
            id: id.to_owned(),
            name: name.to_owned(),
            apps,
        })
    }

    /// Submit every queued resource and install it.
    ///
    /// Returns the deployment id.
    pub async fn deploy(&self, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        if self.is_empty() {
            debug!(unit = name, "nothing to deploy");
            return Ok(id);
        }
        let unit = self.build_unit(&id, name, ResourceStatus::Pending)?;
        info!(unit = name, id = %id, apps = unit.apps.len(), "deploying");

        let response = bounded(self.install_timeout, async {
            self.sync.create_app_context(&unit).await?;
            self.sync.install_app(&id).await
        })
        .await?;

        if !response.installed {
            warn!(unit = name, id = %id, message = %response.message, "install rejected");
            return Err(CoreError::Deployment {
                message: non_empty(response.message, "install was not accepted"),
            });
        }
        Ok(id)
    }

    /// Submit every queued resource as already applied and uninstall it.
    pub async fn undeploy(&self, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        if self.is_empty() {
            debug!(unit = name, "nothing to undeploy");
            return Ok(id);
        }
        let unit = self.build_unit(&id, name, ResourceStatus::Applied)?;
        info!(unit = name, id = %id, apps = unit.apps.len(), "undeploying");

        let response = bounded(self.uninstall_timeout, async {
            self.sync.create_app_context(&unit).await?;
            self.sync.uninstall_app(&id).await
        })
        .await?;

        if !response.uninstalled {
            warn!(unit = name, id = %id, message = %response.message, "uninstall rejected");
            return Err(CoreError::Deployment {
                message: non_empty(response.message, "uninstall was not accepted"),
            });
        }
        Ok(id)
    }

    pub async fn read(&self, id: &str) -> Result<AppContextStatus> {
        bounded(self.uninstall_timeout, self.sync.read_app_context(id)).await
    }
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| CoreError::DeploymentTimeout {
            timeout_secs: limit.as_secs(),
        })?
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.is_empty() {
        fallback.to_owned()
    } else {
        message
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Proposal, ProposalResource};
    use crate::test_support::FakeSync;

    fn proposal(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::Proposal(ProposalResource::from_proposal(
            "ov1",
            &Proposal::new(name, "aes128", "sha256", "modp3072"),
        ))
    }

    fn target(name: &str) -> ClusterId {
        ClusterId::for_entity("ov1", EntityKind::Device, name)
    }

    #[test]
    fn dedups_on_action_name_and_kind() {
        let mut util = ResUtil::new(Arc::new(FakeSync::default()), &OrchestratorConfig::default());
        assert!(util.add_resource(&target("d1"), ResourceAction::Create, proposal("p1")));
        assert!(!util.add_resource(&target("d1"), ResourceAction::Create, proposal("p1")));
        assert!(util.add_resource(&target("d1"), ResourceAction::Delete, proposal("p1")));
        assert!(util.add_resource(&target("d2"), ResourceAction::Create, proposal("p1")));
        assert_eq!(util.resources_for(&target("d1")).len(), 2);
    }

    #[test]
    fn unit_has_one_app_per_target_in_insertion_order() {
        let mut util = ResUtil::new(Arc::new(FakeSync::default()), &OrchestratorConfig::default());
        util.add_resource(&target("d2"), ResourceAction::Create, proposal("p2"));
        util.add_resource(&target("d2"), ResourceAction::Create, proposal("p1"));
        util.add_resource(&target("d1"), ResourceAction::Create, proposal("p1"));

        let unit = util.build_unit("id-1", "unit", ResourceStatus::Pending).unwrap();
        let clusters: Vec<&str> = unit.apps.iter().map(|a| a.cluster.as_str()).collect();
        assert_eq!(clusters, vec!["ov1+device-d2", "ov1+device-d1"]);
        assert_eq!(
            unit.apps[0].order,
            vec!["ov1-p2+IpsecProposal", "ov1-p1+IpsecProposal"]
        );
        assert!(unit.apps[0].dependency.is_empty());
    }

    #[tokio::test]
    async fn undeploy_marks_everything_applied() {
        let sync = Arc::new(FakeSync::default());
        let mut util = ResUtil::new(sync.clone(), &OrchestratorConfig::default());
        util.add_resource(&target("d1"), ResourceAction::Delete, proposal("p1"));
        util.add_resource(&target("d1"), ResourceAction::Delete, proposal("p2"));

        let id = util.undeploy("teardown").await.unwrap();

        let unit = sync.unit(&id).unwrap();
        assert!(
            unit.apps[0]
                .resources
                .iter()
                .all(|r| r.status == ResourceStatus::Applied)
        );
        assert_eq!(sync.uninstalled(), vec![id]);
    }

    #[tokio::test]
    async fn rejected_install_is_an_error() {
        let sync = Arc::new(FakeSync::default());
        sync.reject_installs("cluster not ready");
        let mut util = ResUtil::new(sync, &OrchestratorConfig::default());
        util.add_resource(&target("d1"), ResourceAction::Create, proposal("p1"));

        let err = util.deploy("unit").await.unwrap_err();
        assert!(
            matches!(&err, CoreError::Deployment { message } if message == "cluster not ready"),
            "got {err:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_install_times_out() {
        let sync = Arc::new(FakeSync::default());
        sync.hang_installs();
        let config = OrchestratorConfig::default();
        let mut util = ResUtil::new(sync, &config);
        util.add_resource(&target("d1"), ResourceAction::Create, proposal("p1"));

        let err = util.deploy("unit").await.unwrap_err();
        assert!(
            matches!(err, CoreError::DeploymentTimeout { timeout_secs: 600 }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn empty_unit_is_not_submitted() {
        let sync = Arc::new(FakeSync::default());
        let util = ResUtil::new(sync.clone(), &OrchestratorConfig::default());
        util.deploy("noop").await.unwrap();
        assert_eq!(sync.unit_count(), 0);
    }
}
