// meshwan-api: async clients for the collaborators of the overlay controller.
//
// Three remote surfaces are covered:
//
// - the resource-synchronization service (deployment units, install/uninstall,
//   cluster registration) via [`SyncClient`]
// - the certificate issuer (namespaces, issuers, certificates, secrets)
//   via [`IssuerClient`]
// - edge cluster reachability, probed with the cluster's own kubeconfig
//   via [`ReachabilityProbe`]

pub mod error;
pub mod issuer;
pub mod kubeconfig;
pub mod probe;
mod rest;
pub mod sync;
pub mod transport;

pub use error::Error;
pub use issuer::IssuerClient;
pub use kubeconfig::KubeConfig;
pub use probe::ReachabilityProbe;
pub use sync::SyncClient;
pub use transport::{TlsMode, TransportConfig};
