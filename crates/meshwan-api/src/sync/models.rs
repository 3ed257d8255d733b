// Wire types for the resource-synchronization service.
//
// A deployment unit bundles one app per target cluster; each app lists the
// rendered resources to create or delete, the order in which to apply them,
// and a dependency map that is always empty (resources never wait on each
// other, ordering only matters for apply/rollback bookkeeping).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What the sync service should do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceAction {
    Create,
    Delete,
}

/// Whether the sync service should consider a resource already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    #[default]
    Pending,
    Applied,
}

/// One rendered resource inside an app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub name: String,
    pub kind: String,
    pub action: ResourceAction,
    #[serde(default)]
    pub status: ResourceStatus,
    /// YAML document describing the resource.
    pub content: String,
}

impl ResourceSpec {
    /// Identifier used in the app's order and dependency lists.
    pub fn handle(&self) -> String {
        format!("{}+{}", self.name, self.kind)
    }
}

/// All resources destined for one target cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Registered cluster name, `<provider>+<cluster>`.
    pub cluster: String,
    pub resources: Vec<ResourceSpec>,
    /// Resource handles in the order they must be applied.
    pub order: Vec<String>,
    /// Resource handle -> handles it waits for. Always empty entries.
    pub dependency: BTreeMap<String, Vec<String>>,
}

/// The atomic bundle submitted in one install/uninstall call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentUnit {
    pub id: String,
    pub name: String,
    pub apps: Vec<AppSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResponse {
    pub installed: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallResponse {
    pub uninstalled: bool,
    #[serde(default)]
    pub message: String,
}

/// Status of a deployment unit as tracked by the sync service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppContextStatus {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Cluster registration ─────────────────────────────────────────────

/// GitOps reference used instead of a kubeconfig for mode-3 clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsReference {
    #[serde(rename = "type")]
    pub git_ops_type: String,
    pub reference_object: String,
    pub resource_object: String,
}

/// How the sync service reaches a registered cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClusterCredentials {
    /// Base64 kubeconfig with the server already pointed at the resolved IP.
    #[serde(rename_all = "camelCase")]
    KubeConfig { kube_config: String },
    #[serde(rename_all = "camelCase")]
    GitOps { git_ops: GitOpsReference },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRegistration {
    pub provider: String,
    pub cluster: String,
    pub credentials: ClusterCredentials,
}
