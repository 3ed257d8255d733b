// ── Common building blocks ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{CoreError, Result};

/// Kinds of objects the orchestrator manages, used in keys and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum EntityKind {
    Overlay,
    Proposal,
    IpRange,
    Hub,
    Device,
    Certificate,
    Connection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Lifecycle of a hub or device registration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RegistrationState {
    #[default]
    Pending,
    Success,
    Failed,
}

/// How the control plane reaches an edge cluster.
///
/// Serialized as the numeric mode (1, 2 or 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ConnectivityMode {
    /// Reachable on one of its public IPs.
    Direct,
    /// Reached through the SCC on an allocated overlay IP.
    Proxied,
    /// Managed through a GitOps repository, never contacted directly.
    GitOps,
}

impl From<ConnectivityMode> for u8 {
    fn from(mode: ConnectivityMode) -> Self {
        match mode {
            ConnectivityMode::Direct => 1,
            ConnectivityMode::Proxied => 2,
            ConnectivityMode::GitOps => 3,
        }
    }
}

impl TryFrom<u8> for ConnectivityMode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Direct),
            2 => Ok(Self::Proxied),
            3 => Ok(Self::GitOps),
            other => Err(format!("unknown connectivity mode {other}")),
        }
    }
}

impl std::fmt::Display for ConnectivityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Reference to a GitOps-managed cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsParam {
    #[serde(rename = "type")]
    pub git_ops_type: String,
    pub reference_object: String,
    pub resource_object: String,
}

impl GitOpsParam {
    pub fn validate(&self) -> Result<()> {
        if self.git_ops_type.is_empty()
            || self.reference_object.is_empty()
            || self.resource_object.is_empty()
        {
            return Err(CoreError::validation(
                "gitOpsParam needs type, referenceObject and resourceObject",
            ));
        }
        Ok(())
    }
}

/// Names end up in resource names, secret names and store keys.
pub fn validate_name(kind: EntityKind, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "{kind} name '{name}' must be 1-63 lowercase alphanumerics or '-'"
        )))
    }
}
