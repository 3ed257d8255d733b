use thiserror::Error;

/// Top-level error type for the `meshwan-api` crate.
///
/// Covers every failure mode across the collaborator surfaces:
/// transport, structured API errors, kubeconfig handling and reachability
/// probes. `meshwan-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The remote side rejected our credentials (HTTP 401/403).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── API ─────────────────────────────────────────────────────────
    /// Structured error returned by a collaborator.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The supplied kubeconfig could not be decoded or lacks a usable context.
    #[error("Invalid kubeconfig: {0}")]
    KubeConfig(String),

    // ── Probe ───────────────────────────────────────────────────────
    /// The edge cluster did not answer at the given address.
    #[error("{target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },
}

impl Error {
    /// Returns `true` if the remote side rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the object already exists on the remote side.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn api_status_classification() {
        let not_found = Error::Api {
            status: 404,
            message: "missing".into(),
            code: None,
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_unauthorized());

        let conflict = Error::Api {
            status: 409,
            message: "exists".into(),
            code: Some("AlreadyExists".into()),
        };
        assert!(conflict.is_conflict());

        let forbidden = Error::Api {
            status: 403,
            message: "nope".into(),
            code: None,
        };
        assert!(forbidden.is_unauthorized());
    }

    #[test]
    fn unreachable_is_not_a_credential_problem() {
        let err = Error::Unreachable {
            target: "10.0.0.1".into(),
            reason: "connection refused".into(),
        };
        assert!(!err.is_unauthorized());
        assert!(!err.is_not_found());
    }
}
