// Registration steps shared by hubs and devices.

use meshwan_api::KubeConfig;
use meshwan_api::sync::models::{ClusterCredentials, ClusterRegistration, GitOpsReference};
use tracing::debug;

use super::context::ManagerContext;
use crate::deploy::ClusterId;
use crate::error::{CoreError, Result};
use crate::model::{ConnectivityMode, GitOpsParam};

pub(super) fn parse_kubeconfig(encoded: &str) -> Result<KubeConfig> {
    KubeConfig::from_base64(encoded)
        .map_err(|e| CoreError::validation(format!("invalid kubeConfig: {e}")))
}

/// Mode 3: the referenced GitOps objects must already exist.
pub(super) async fn check_gitops(ctx: &ManagerContext, param: Option<&GitOpsParam>) -> Result<()> {
    let param = param
        .ok_or_else(|| CoreError::validation("gitOpsParam is required without a kubeConfig"))?;
    param.validate()?;
    for object in [&param.reference_object, &param.resource_object] {
        if !ctx
            .registry
            .gitops_object_exists(&param.git_ops_type, object)
            .await?
        {
            return Err(CoreError::validation(format!(
                "{} object '{object}' does not exist",
                param.git_ops_type
            )));
        }
    }
    Ok(())
}

/// Mode 1: probe every public IP in order; the first that answers wins.
pub(super) async fn resolve_public_ip(
    ctx: &ManagerContext,
    kubeconfig: &KubeConfig,
    public_ips: &[String],
) -> Result<String> {
    let mut failures = Vec::with_capacity(public_ips.len());
    for ip in public_ips {
        match ctx.prober.probe(kubeconfig, ip).await {
            Ok(()) => return Ok(ip.clone()),
            Err(e) => {
                debug!(%ip, error = %e, "public IP not reachable");
                failures.push(format!("{ip}: {e}"));
            }
        }
    }
    Err(CoreError::Registration {
        message: format!("no public IP reachable ({})", failures.join("; ")),
    })
}

/// Probe the cluster at `ip` (when it has a kubeconfig) and register it
/// with the sync service.
pub(super) async fn register(
    ctx: &ManagerContext,
    cluster: &ClusterId,
    mode: ConnectivityMode,
    kube_config: Option<&str>,
    ip: &str,
    git_ops: Option<&GitOpsParam>,
) -> Result<()> {
    let credentials = match mode {
        ConnectivityMode::GitOps => {
            check_gitops(ctx, git_ops).await?;
            let param = git_ops.cloned().unwrap_or_default();
            ClusterCredentials::GitOps {
                git_ops: GitOpsReference {
                    git_ops_type: param.git_ops_type,
                    reference_object: param.reference_object,
                    resource_object: param.resource_object,
                },
            }
        }
        ConnectivityMode::Direct | ConnectivityMode::Proxied => {
            let encoded = kube_config
                .ok_or_else(|| CoreError::validation("kubeConfig is required"))?;
            let kubeconfig = parse_kubeconfig(encoded)?;
            ctx.prober.probe(&kubeconfig, ip).await?;
            let pointed = kubeconfig.with_server_host(ip)?;
            ClusterCredentials::KubeConfig {
                kube_config: pointed.to_base64()?,
            }
        }
    };

    ctx.registry
        .register_cluster(&ClusterRegistration {
            provider: cluster.provider.clone(),
            cluster: cluster.cluster.clone(),
            credentials,
        })
        .await
}
