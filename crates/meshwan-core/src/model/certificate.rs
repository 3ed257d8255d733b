// ── Certificate objects ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::common::Metadata;

/// What a certificate identifies; decides its secret name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ClusterType {
    Overlay,
    Hub,
    Device,
}

impl ClusterType {
    /// Deterministic certificate name for `entity`.
    pub fn cert_name(self, entity: &str) -> String {
        match self {
            Self::Overlay => format!("{entity}-cert"),
            Self::Hub => format!("hub-{entity}-cert"),
            Self::Device => format!("device-{entity}-cert"),
        }
    }
}

/// PEM material for one certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateData {
    /// Issuing CA certificate.
    pub ca: String,
    pub cert: String,
    pub key: String,
}

/// A user-visible certificate. `data` is never stored; it is fetched
/// from the issuer whenever the object is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateObject {
    pub metadata: Metadata,
    pub spec: CertificateSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CertificateData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    pub cluster_type: ClusterType,
    #[serde(rename = "isCA", default)]
    pub is_ca: bool,
}

impl Default for CertificateSpec {
    fn default() -> Self {
        Self {
            cluster_type: ClusterType::Device,
            is_ca: false,
        }
    }
}
