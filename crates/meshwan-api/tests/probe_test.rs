#![allow(clippy::unwrap_used)]
// Reachability probe against a wiremock "API server".

use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use meshwan_api::{Error, KubeConfig, ReachabilityProbe};

/// Kubeconfig whose server points at an unroutable host on the mock's port.
fn kubeconfig_for(server: &MockServer) -> KubeConfig {
    let port = server.address().port();
    KubeConfig::from_yaml(&format!(
        r"
clusters:
- name: edge
  cluster:
    server: http://edge.invalid:{port}
users:
- name: admin
  user:
    token: edge-token
contexts:
- name: default
  context:
    cluster: edge
    user: admin
current-context: default
"
    ))
    .unwrap()
}

#[tokio::test]
async fn test_probe_success_at_rewritten_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .and(header("authorization", "Bearer edge-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"gitVersion":"v1.29.0"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let probe = ReachabilityProbe::new(Duration::from_secs(2));
    probe
        .probe(&kubeconfig_for(&server), "127.0.0.1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_probe_forbidden_is_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let probe = ReachabilityProbe::new(Duration::from_secs(2));
    let err = probe
        .probe(&kubeconfig_for(&server), "127.0.0.1")
        .await
        .unwrap_err();
    assert!(err.is_unauthorized(), "got: {err:?}");
}

#[tokio::test]
async fn test_probe_server_error_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let probe = ReachabilityProbe::new(Duration::from_secs(2));
    let err = probe
        .probe(&kubeconfig_for(&server), "127.0.0.1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unreachable { .. }), "got: {err:?}");
}
