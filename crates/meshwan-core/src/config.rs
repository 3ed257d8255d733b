// ── Orchestrator configuration ──

use std::time::Duration;

/// Runtime settings for an [`Orchestrator`](crate::Orchestrator).
///
/// Built by `meshwan-config` from the user's config file; the defaults
/// match a stock deployment.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Namespace holding every issuer, certificate and secret.
    pub cert_namespace: String,
    /// Self-signed root issuer.
    pub root_issuer: String,
    /// Root CA certificate, issued by `root_issuer`.
    pub root_cert: String,
    /// Registration poll period while an entity is pending.
    pub poll_interval: Duration,
    /// How long deletion waits for a cancelled registration task.
    pub cancel_grace: Duration,
    /// Upper bound for an install call.
    pub install_timeout: Duration,
    /// Upper bound for uninstall and status reads.
    pub uninstall_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cert_namespace: "meshwan-system".into(),
            root_issuer: "meshwan-root-issuer".into(),
            root_cert: "meshwan-root-cert".into(),
            poll_interval: Duration::from_secs(5),
            cancel_grace: Duration::from_secs(2),
            install_timeout: Duration::from_secs(600),
            uninstall_timeout: Duration::from_secs(10),
        }
    }
}
