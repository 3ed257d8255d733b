// HTTP client for the certificate issuer.
//
// Base path: /v1/namespaces/{ns}/
// Auth: bearer token
//
// Creation calls are idempotent on the wire: HTTP 409 (already exists) is
// reported as success so callers get create-if-absent semantics.

use secrecy::SecretString;
use tracing::debug;

use super::models::{CertificateSpec, IssuerSpec, SecretData};
use crate::error::Error;
use crate::rest::RestClient;
use crate::transport::TransportConfig;

/// Async client for the certificate issuer.
#[derive(Debug, Clone)]
pub struct IssuerClient {
    rest: RestClient,
}

impl IssuerClient {
    /// Build from a base URL, optional bearer token and transport config.
    pub fn new(
        base_url: &str,
        token: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client_with_token(token)?;
        Ok(Self {
            rest: RestClient::new(http, base_url)?,
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            rest: RestClient::new(http, base_url)?,
        })
    }

    // ── Namespaces ───────────────────────────────────────────────────

    /// `PUT /v1/namespaces/{ns}`
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<(), Error> {
        tolerate_conflict(
            self.rest
                .put_no_response(
                    &format!("v1/namespaces/{namespace}"),
                    &serde_json::json!({ "name": namespace }),
                )
                .await,
        )
    }

    // ── Issuers ──────────────────────────────────────────────────────

    /// `PUT /v1/namespaces/{ns}/issuers/{name}`
    pub async fn create_issuer(
        &self,
        namespace: &str,
        name: &str,
        spec: &IssuerSpec,
    ) -> Result<(), Error> {
        debug!(namespace, name, "creating issuer");
        tolerate_conflict(
            self.rest
                .put_no_response(&format!("v1/namespaces/{namespace}/issuers/{name}"), spec)
                .await,
        )
    }

    /// `DELETE /v1/namespaces/{ns}/issuers/{name}`
    pub async fn delete_issuer(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.rest
            .delete(&format!("v1/namespaces/{namespace}/issuers/{name}"))
            .await
    }

    // ── Certificates ─────────────────────────────────────────────────

    /// `PUT /v1/namespaces/{ns}/certificates/{name}`
    pub async fn create_certificate(
        &self,
        namespace: &str,
        name: &str,
        spec: &CertificateSpec,
    ) -> Result<(), Error> {
        debug!(namespace, name, issuer = %spec.issuer_ref, "creating certificate");
        tolerate_conflict(
            self.rest
                .put_no_response(
                    &format!("v1/namespaces/{namespace}/certificates/{name}"),
                    spec,
                )
                .await,
        )
    }

    /// Delete a certificate and the secret holding its key pair.
    ///
    /// `DELETE /v1/namespaces/{ns}/certificates/{name}` then
    /// `DELETE /v1/namespaces/{ns}/secrets/{name}`
    pub async fn delete_certificate(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.rest
            .delete(&format!("v1/namespaces/{namespace}/certificates/{name}"))
            .await?;
        match self
            .rest
            .delete(&format!("v1/namespaces/{namespace}/secrets/{name}"))
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    // ── Secrets ──────────────────────────────────────────────────────

    /// `GET /v1/namespaces/{ns}/secrets/{name}`
    pub async fn get_secret(&self, namespace: &str, name: &str) -> Result<SecretData, Error> {
        self.rest
            .get(&format!("v1/namespaces/{namespace}/secrets/{name}"))
            .await
    }
}

fn tolerate_conflict(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(e) if e.is_conflict() => {
            debug!("object already exists, treating as created");
            Ok(())
        }
        other => other,
    }
}
