// ── IPsec resource descriptors ──
//
// These are what ends up on an edge cluster. Each descriptor renders to a
// single YAML document (`apiVersion / kind / metadata / spec`) that the
// sync service applies verbatim.

use serde::{Deserialize, Serialize};

use super::proposal::Proposal;
use crate::error::{CoreError, Result};

pub const API_VERSION: &str = "meshwan.io/v1alpha1";

pub const KIND_PROPOSAL: &str = "IpsecProposal";
/// Route-based tunnel terminated on a VTI.
pub const KIND_SITE: &str = "IpsecSite";
/// Policy-based tunnel.
pub const KIND_HOST: &str = "IpsecHost";

pub const UPDOWN_VTI: &str = "/etc/updown";
pub const UPDOWN_IPTABLES: &str = "/etc/updown_oip";

pub const REMOTE_ANY: &str = "%any";
pub const SOURCE_IP_CONFIG: &str = "%config";

/// Anti-replay mark shared by every tunnel.
const CONNECTION_MARK: &str = "30";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResource {
    pub name: String,
    pub encryption: String,
    pub hash: String,
    pub dh_group: String,
}

impl ProposalResource {
    pub fn from_proposal(overlay: &str, proposal: &Proposal) -> Self {
        Self {
            name: proposal_resource_name(overlay, proposal.name()),
            encryption: proposal.spec.encryption.clone(),
            hash: proposal.spec.hash.clone(),
            dh_group: proposal.spec.dh_group.clone(),
        }
    }
}

pub fn proposal_resource_name(overlay: &str, proposal: &str) -> String {
    format!("{overlay}-{proposal}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpsecMode {
    #[serde(rename = "VTI-based")]
    VtiBased,
    #[serde(rename = "policy-based")]
    PolicyBased,
}

/// One child SA definition inside an ipsec resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpsecConnection {
    pub name: String,
    pub connection_type: String,
    pub mode: String,
    pub mark: String,
    pub local_updown: String,
    pub crypto_proposal: Vec<String>,
}

impl IpsecConnection {
    pub fn tunnel(name: impl Into<String>, updown: &str, proposals: &[String]) -> Self {
        Self {
            name: name.into(),
            connection_type: "tunnel".into(),
            mode: "start".into(),
            mark: CONNECTION_MARK.into(),
            local_updown: updown.into(),
            crypto_proposal: proposals.to_vec(),
        }
    }
}

/// Authentication and addressing for one end of a tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpsecResource {
    pub name: String,
    #[serde(rename = "type")]
    pub mode: IpsecMode,
    pub remote: String,
    pub authentication_method: String,
    /// Base64 PEM of this end's certificate.
    pub public_cert: String,
    /// Base64 PEM of this end's private key.
    pub private_cert: String,
    /// Base64 PEM of the overlay CA.
    #[serde(rename = "sharedCA")]
    pub shared_ca: String,
    pub local_identifier: String,
    pub remote_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_source_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_source_ip: Option<String>,
    pub crypto_proposal: Vec<String>,
    pub force_crypto_proposal: String,
    pub connections: Vec<IpsecConnection>,
}

impl IpsecResource {
    pub fn kind(&self) -> &'static str {
        match self.mode {
            IpsecMode::VtiBased => KIND_SITE,
            IpsecMode::PolicyBased => KIND_HOST,
        }
    }
}

/// Anything that can be deployed as part of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum ResourceDescriptor {
    Proposal(ProposalResource),
    Ipsec(IpsecResource),
}

impl ResourceDescriptor {
    pub fn name(&self) -> &str {
        match self {
            Self::Proposal(p) => &p.name,
            Self::Ipsec(r) => &r.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Proposal(_) => KIND_PROPOSAL,
            Self::Ipsec(r) => r.kind(),
        }
    }

    /// Render as the YAML document submitted to the sync service.
    pub fn render(&self) -> Result<String> {
        let spec = match self {
            Self::Proposal(p) => serde_yaml::to_value(p),
            Self::Ipsec(r) => serde_yaml::to_value(r),
        }
        .map_err(yaml_error)?;

        let mut spec = spec;
        if let serde_yaml::Value::Mapping(map) = &mut spec {
            map.shift_remove("name");
        }

        let mut metadata = serde_yaml::Mapping::new();
        metadata.insert("name".into(), self.name().into());

        let mut doc = serde_yaml::Mapping::new();
        doc.insert("apiVersion".into(), API_VERSION.into());
        doc.insert("kind".into(), self.kind().into());
        doc.insert("metadata".into(), serde_yaml::Value::Mapping(metadata));
        doc.insert("spec".into(), spec);

        serde_yaml::to_string(&doc).map_err(yaml_error)
    }
}

fn yaml_error(e: serde_yaml::Error) -> CoreError {
    CoreError::Internal(format!("cannot render resource: {e}"))
}
