// ── Core error types ──
//
// Domain errors for meshwan-core. Collaborator failures arrive as
// `meshwan_api::Error` and are translated by the `From` impl below, so
// callers match on domain variants rather than HTTP details.

use thiserror::Error;

use crate::model::EntityKind;

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Client errors ────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: EntityKind, name: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("{kind} '{name}' is in use")]
    InUse { kind: EntityKind, name: String },

    // ── Dependency errors ────────────────────────────────────────────
    #[error("Overlay '{overlay}' has no proposals defined")]
    MissingProposal { overlay: String },

    #[error("Unknown connection type: {0}")]
    UnknownConnectionType(String),

    // ── Address allocation ───────────────────────────────────────────
    #[error("No available IP in overlay '{overlay}'")]
    NoAvailableIp { overlay: String },

    #[error("IP {ip} is not allocated")]
    NotAllocated { ip: String },

    #[error("IP {ip} is outside the range")]
    OutOfRange { ip: String },

    // ── Collaborator errors ──────────────────────────────────────────
    #[error("Certificate '{name}': {message}")]
    Certificate { name: String, message: String },

    #[error("Deployment failed: {message}")]
    Deployment { message: String },

    #[error("Deployment timed out after {timeout_secs}s")]
    DeploymentTimeout { timeout_secs: u64 },

    #[error("Registration failed: {message}")]
    Registration { message: String },

    #[error("Credentials rejected: {message}")]
    Unauthorized { message: String },

    #[error("{target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        code: Option<String>,
        status: Option<u16>,
    },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// HTTP status a routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. }
            | Self::MissingProposal { .. }
            | Self::UnknownConnectionType(_)
            | Self::OutOfRange { .. } => 422,
            Self::NotFound { .. } | Self::NotAllocated { .. } => 404,
            Self::AlreadyExists { .. } | Self::Conflict { .. } | Self::InUse { .. } => 409,
            Self::DeploymentTimeout { .. } => 504,
            _ => 500,
        }
    }

    /// Credential problems are final; everything else may clear up on retry.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<meshwan_api::Error> for CoreError {
    fn from(err: meshwan_api::Error) -> Self {
        use meshwan_api::Error as Api;
        match err {
            Api::Authentication { message } => CoreError::Unauthorized { message },
            Api::Unreachable { target, reason } => CoreError::Unreachable { target, reason },
            Api::Timeout { timeout_secs } => CoreError::DeploymentTimeout { timeout_secs },
            Api::Transport(ref e) => CoreError::Unreachable {
                target: e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: e.to_string(),
            },
            Api::InvalidUrl(e) => CoreError::Validation {
                message: format!("invalid URL: {e}"),
            },
            Api::Tls(message) => CoreError::Api {
                message: format!("TLS: {message}"),
                code: None,
                status: None,
            },
            Api::Api {
                status,
                message,
                code,
            } => {
                if status == 401 || status == 403 {
                    CoreError::Unauthorized { message }
                } else {
                    CoreError::Api {
                        message,
                        code,
                        status: Some(status),
                    }
                }
            }
            Api::Deserialization { message, .. } => CoreError::Api {
                message: format!("unexpected response: {message}"),
                code: None,
                status: None,
            },
            Api::KubeConfig(message) => CoreError::Validation {
                message: format!("kubeConfig: {message}"),
            },
        }
    }
}
