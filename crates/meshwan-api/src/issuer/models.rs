// Wire types for the certificate issuer.

use serde::{Deserialize, Serialize};

/// How an issuer signs certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssuerSpec {
    /// Signs with the certificate's own key (root of trust).
    SelfSigned {},
    /// Signs with the CA key pair stored in `secret_name`.
    #[serde(rename_all = "camelCase")]
    Ca { secret_name: String },
}

/// Request to issue a certificate into a secret of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    pub common_name: String,
    #[serde(rename = "isCA")]
    pub is_ca: bool,
    pub issuer_ref: String,
    pub secret_name: String,
}

/// PEM material stored for an issued certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretData {
    /// Issuing CA certificate (PEM); empty for self-signed roots.
    #[serde(default)]
    pub ca: String,
    pub cert: String,
    pub key: String,
}
