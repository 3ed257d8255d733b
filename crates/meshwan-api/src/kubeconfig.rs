// ── Kubeconfig handling ──
//
// Edge clusters are onboarded with a base64-encoded kubeconfig. We only
// need the current context's server URL and client credentials, and the
// ability to point that server at a different address (the candidate
// public IP or the allocated overlay IP) before probing or registering.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterInfo {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: AuthInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub cluster: String,
    pub user: String,
}

impl KubeConfig {
    /// Decode a base64-encoded kubeconfig YAML document.
    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::KubeConfig(format!("not valid base64: {e}")))?;
        let text = String::from_utf8(raw)
            .map_err(|e| Error::KubeConfig(format!("not valid UTF-8: {e}")))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        let cfg: Self =
            serde_yaml::from_str(text).map_err(|e| Error::KubeConfig(format!("bad YAML: {e}")))?;
        cfg.current()?;
        Ok(cfg)
    }

    pub fn to_base64(&self) -> Result<String, Error> {
        let text =
            serde_yaml::to_string(self).map_err(|e| Error::KubeConfig(format!("encode: {e}")))?;
        Ok(STANDARD.encode(text))
    }

    /// Resolve the current context to its cluster and user entries.
    ///
    /// Falls back to the first context when `current-context` is unset.
    pub fn current(&self) -> Result<(&ClusterInfo, &AuthInfo), Error> {
        let ctx = match &self.current_context {
            Some(name) => self.contexts.iter().find(|c| &c.name == name),
            None => self.contexts.first(),
        }
        .ok_or_else(|| Error::KubeConfig("no usable context".into()))?;

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == ctx.context.cluster)
            .ok_or_else(|| {
                Error::KubeConfig(format!("context references unknown cluster '{}'", ctx.context.cluster))
            })?;
        let user = self
            .users
            .iter()
            .find(|u| u.name == ctx.context.user)
            .ok_or_else(|| {
                Error::KubeConfig(format!("context references unknown user '{}'", ctx.context.user))
            })?;
        Ok((&cluster.cluster, &user.user))
    }

    /// Server URL of the current context.
    pub fn server(&self) -> Result<Url, Error> {
        let (cluster, _) = self.current()?;
        Ok(Url::parse(&cluster.server)?)
    }

    /// Copy of this kubeconfig with the current cluster's server host
    /// replaced by `host`. Scheme, port and path are kept.
    pub fn with_server_host(&self, host: &str) -> Result<Self, Error> {
        let mut server = self.server()?;
        server
            .set_host(Some(host))
            .map_err(|e| Error::KubeConfig(format!("cannot use '{host}' as server host: {e}")))?;

        let cluster_name = self.current_cluster_name()?;
        let mut copy = self.clone();
        for entry in &mut copy.clusters {
            if entry.name == cluster_name {
                entry.cluster.server = server.as_str().trim_end_matches('/').to_owned();
            }
        }
        Ok(copy)
    }

    fn current_cluster_name(&self) -> Result<String, Error> {
        let ctx = match &self.current_context {
            Some(name) => self.contexts.iter().find(|c| &c.name == name),
            None => self.contexts.first(),
        }
        .ok_or_else(|| Error::KubeConfig("no usable context".into()))?;
        Ok(ctx.context.cluster.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r"
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

    #[test]
    fn parses_current_context() {
        let cfg = KubeConfig::from_yaml(SAMPLE).unwrap();
        let (cluster, user) = cfg.current().unwrap();
        assert_eq!(cluster.server, "https://192.0.2.10:6443");
        assert_eq!(user.token.as_deref(), Some("abc123"));
    }

    #[test]
    fn rewrites_server_host_keeping_port() {
        let cfg = KubeConfig::from_yaml(SAMPLE).unwrap();
        let moved = cfg.with_server_host("1.2.3.4").unwrap();
        assert_eq!(moved.server().unwrap().as_str(), "https://1.2.3.4:6443/");
        // original untouched
        assert_eq!(cfg.server().unwrap().host_str(), Some("192.0.2.10"));
    }

    #[test]
    fn base64_round_trip_preserves_context() {
        let cfg = KubeConfig::from_yaml(SAMPLE).unwrap();
        let encoded = cfg.to_base64().unwrap();
        let decoded = KubeConfig::from_base64(&encoded).unwrap();
        assert_eq!(decoded, cfg);
    }

    #[test]
    fn rejects_missing_context() {
        let err = KubeConfig::from_yaml("clusters: []\nusers: []\ncontexts: []\n").unwrap_err();
        assert!(matches!(err, Error::KubeConfig(_)));
    }

    #[test]
    fn rejects_garbage_base64() {
        assert!(KubeConfig::from_base64("%%%not-base64%%%").is_err());
    }
}
