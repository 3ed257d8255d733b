// ── Crypto proposal ──

use serde::{Deserialize, Serialize};

use super::common::Metadata;
use crate::error::{CoreError, Result};

/// An IKE/IPsec algorithm triple offered by both ends of every tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub metadata: Metadata,
    pub spec: ProposalSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSpec {
    pub encryption: String,
    pub hash: String,
    pub dh_group: String,
}

impl Proposal {
    pub fn new(
        name: impl Into<String>,
        encryption: impl Into<String>,
        hash: impl Into<String>,
        dh_group: impl Into<String>,
    ) -> Self {
        Self {
            metadata: Metadata::named(name),
            spec: ProposalSpec {
                encryption: encryption.into(),
                hash: hash.into(),
                dh_group: dh_group.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn validate(&self) -> Result<()> {
        let spec = &self.spec;
        for (field, value) in [
            ("encryption", &spec.encryption),
            ("hash", &spec.hash),
            ("dhGroup", &spec.dh_group),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::validation(format!(
                    "proposal '{}' is missing {field}",
                    self.metadata.name
                )));
            }
        }
        Ok(())
    }
}
