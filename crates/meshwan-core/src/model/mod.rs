// ── Domain model ──
//
// Persisted objects share the `metadata / spec / status` shape and are
// serialized camelCase. Children of an overlay are stored under keys that
// include the overlay name (see `crate::store::keys`).

pub mod certificate;
pub mod common;
pub mod connection;
pub mod device;
pub mod hub;
pub mod iprange;
pub mod overlay;
pub mod proposal;
pub mod resource;

// ── Re-exports ──────────────────────────────────────────────────────

pub use certificate::{CertificateData, CertificateObject, CertificateSpec, ClusterType};
pub use common::{
    ConnectivityMode, EntityKind, GitOpsParam, Metadata, RegistrationState, validate_name,
};
pub use connection::{
    ConnectionEnd, ConnectionObject, ConnectionState, EndpointOwner, ResourceRef, TopologyKind,
};
pub use device::{Device, DeviceSpec, DeviceStatus};
pub use hub::{Hub, HubSpec, HubStatus};
pub use iprange::{IpRange, IpRangeSpec, IpRangeStatus};
pub use overlay::{Overlay, OverlayStatus};
pub use proposal::{Proposal, ProposalSpec};
pub use resource::{
    IpsecConnection, IpsecMode, IpsecResource, ProposalResource, ResourceDescriptor,
};
