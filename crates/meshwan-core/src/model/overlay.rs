// ── Overlay domain type ──

use serde::{Deserialize, Serialize};

use super::common::Metadata;

/// A named VPN fabric. Every other object is scoped to one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub metadata: Metadata,
    #[serde(default)]
    pub status: OverlayStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayStatus {
    #[serde(default)]
    pub cert_name: String,
    #[serde(default)]
    pub issuer_name: String,
}

impl Overlay {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata::named(name),
            status: OverlayStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
