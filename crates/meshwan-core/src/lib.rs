// meshwan-core: control plane for IPsec overlays.
//
// An overlay groups hubs and devices that are connected by IPsec tunnels.
// This crate owns the domain model, address allocation, the certificate
// hierarchy, tunnel resource generation and the registration lifecycle of
// edge clusters. Collaborators (certificate issuer, resource sync service,
// reachability probe) sit behind traits so they can be swapped for fakes.

pub mod certs;
pub mod config;
pub mod connections;
pub mod deploy;
pub mod error;
pub mod ipalloc;
pub mod manager;
pub mod model;
pub mod orchestrator;
pub mod registration;
pub mod store;
pub mod topology;

#[cfg(test)]
mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────

pub use certs::{CHAIN_SEPARATOR, CertificateIssuer, CertificateOrchestrator, ChainSelector};
pub use config::OrchestratorConfig;
pub use connections::ConnectionStore;
pub use deploy::{ClusterId, ResUtil, ResourceSync};
pub use error::{CoreError, Result};
pub use manager::{
    CertificateManager, Collaborators, ConnectionManager, DeviceManager, EntityManager,
    HubDeviceLink, HubDeviceManager, HubManager, IpRangeManager, OverlayManager,
    ProposalManager,
};
pub use model::*;
pub use orchestrator::Orchestrator;
pub use registration::{ClusterRegistry, Prober};
pub use store::{DocumentStore, FileStore, MemoryStore, StoreKey, TypedStore};
pub use topology::TopologyBuilder;
