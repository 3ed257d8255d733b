//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use meshwan_config::ConfigError;
use meshwan_core::{CoreError, EntityKind};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Collaborators ────────────────────────────────────────────────
    #[error("Could not reach {target}: {reason}")]
    #[diagnostic(
        code(meshwan::unreachable),
        help(
            "Check that the service is running and that sync.url / issuer.url\n\
             in the config point at it. Run: meshwan config show"
        )
    )]
    Unreachable { target: String, reason: String },

    #[error("Credentials rejected: {message}")]
    #[diagnostic(
        code(meshwan::auth_failed),
        help(
            "Store a token with: meshwan config set-token sync|issuer\n\
             or point token_env at a variable holding it."
        )
    )]
    AuthFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(meshwan::not_found),
        help("Run: meshwan {list_command} to see what exists")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(meshwan::already_exists))]
    AlreadyExists {
        resource_type: String,
        identifier: String,
    },

    #[error("{message}")]
    #[diagnostic(code(meshwan::conflict))]
    Conflict { message: String },

    // ── Operations ───────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(meshwan::operation_failed))]
    OperationFailed { message: String },

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(meshwan::timeout),
        help("The operation may still complete. Run: meshwan watch")
    )]
    Timeout { seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(meshwan::validation))]
    Validation { field: String, reason: String },

    #[error("No overlay selected")]
    #[diagnostic(
        code(meshwan::no_overlay),
        help("Pass --overlay (-O) or set MESHWAN_OVERLAY")
    )]
    NoOverlay,

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(meshwan::config),
        help("Run: meshwan config path to locate the config file")
    )]
    Config(#[from] ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(meshwan::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(meshwan::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoOverlay | Self::NonInteractiveRequiresYes { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

/// `meshwan <list_command>` that shows objects of `kind`.
fn list_command(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Overlay => "overlay list",
        EntityKind::Proposal => "proposal list",
        EntityKind::IpRange => "iprange list",
        EntityKind::Hub => "hub list",
        EntityKind::Device => "device list",
        EntityKind::Certificate => "cert list",
        EntityKind::Connection => "connection list",
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { kind, name } => CliError::NotFound {
                resource_type: kind.to_string(),
                identifier: name,
                list_command: list_command(kind).into(),
            },

            CoreError::NotAllocated { ip } => CliError::NotFound {
                resource_type: "allocation".into(),
                identifier: ip,
                list_command: "iprange list".into(),
            },

            CoreError::AlreadyExists { kind, name } => CliError::AlreadyExists {
                resource_type: kind.to_string(),
                identifier: name,
            },

            err @ (CoreError::Conflict { .. } | CoreError::InUse { .. }) => {
                CliError::Conflict {
                    message: err.to_string(),
                }
            }

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            err @ (CoreError::MissingProposal { .. }
            | CoreError::UnknownConnectionType(_)
            | CoreError::OutOfRange { .. }) => CliError::Validation {
                field: "input".into(),
                reason: err.to_string(),
            },

            CoreError::Unauthorized { message } => CliError::AuthFailed { message },

            CoreError::Unreachable { target, reason } => CliError::Unreachable { target, reason },

            CoreError::DeploymentTimeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            other => CliError::OperationFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<meshwan_api::Error> for CliError {
    fn from(err: meshwan_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_documented_exit_codes() {
        let cases = [
            (
                CoreError::NotFound {
                    kind: EntityKind::Hub,
                    name: "h1".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::InUse {
                    kind: EntityKind::IpRange,
                    name: "r1".into(),
                },
                exit_code::CONFLICT,
            ),
            (
                CoreError::MissingProposal {
                    overlay: "ov1".into(),
                },
                exit_code::USAGE,
            ),
            (
                CoreError::Unreachable {
                    target: "sync".into(),
                    reason: "refused".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::DeploymentTimeout { timeout_secs: 600 },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::Deployment {
                    message: "boom".into(),
                },
                exit_code::GENERAL,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn not_found_points_at_the_list_command() {
        let err = CliError::from(CoreError::NotFound {
            kind: EntityKind::Proposal,
            name: "p9".into(),
        });
        let CliError::NotFound { list_command, .. } = err else {
            panic!("expected NotFound");
        };
        assert_eq!(list_command, "proposal list");
    }
}
