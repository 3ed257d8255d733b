// Reachability probe for edge clusters.
//
// A candidate address is considered reachable when the cluster's API
// server answers `GET /version` there using the credentials from the
// cluster's own kubeconfig. Server certificates are not verified: the
// address being probed is usually not among the certificate's SANs.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::error::Error;
use crate::kubeconfig::KubeConfig;

#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    timeout: Duration,
}

impl Default for ReachabilityProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ReachabilityProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Probe the cluster described by `kubeconfig` at `host`.
    ///
    /// Returns `Error::Authentication` when the API server answered but
    /// refused the credentials, and `Error::Unreachable` for every other
    /// failure.
    pub async fn probe(&self, kubeconfig: &KubeConfig, host: &str) -> Result<(), Error> {
        let target = kubeconfig.with_server_host(host)?;
        let server = target.server()?;
        let (_, auth) = target.current()?;

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true);

        if let (Some(cert), Some(key)) = (&auth.client_certificate_data, &auth.client_key_data) {
            let mut pem = decode_pem(cert)?;
            pem.push(b'\n');
            pem.extend(decode_pem(key)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| Error::Tls(format!("invalid client identity: {e}")))?;
            builder = builder.identity(identity);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build probe client: {e}")))?;

        let url = server.join("version")?;
        debug!(%url, "probing edge cluster");

        let mut request = http.get(url);
        if let Some(token) = &auth.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|e| Error::Unreachable {
            target: host.to_owned(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                message: format!("{host} rejected kubeconfig credentials (HTTP {status})"),
            });
        }
        Err(Error::Unreachable {
            target: host.to_owned(),
            reason: format!("unexpected HTTP {status}"),
        })
    }
}

fn decode_pem(data: &str) -> Result<Vec<u8>, Error> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| Error::KubeConfig(format!("client credential is not valid base64: {e}")))
}
