// ── Entity managers ──
//
// One manager per object kind. Each is a cheap handle over the shared
// `ManagerContext`; the CRUD surface is the `EntityManager` capability
// trait, with orchestration hooks (registration, connection setup) as
// inherent methods on the concrete managers.

mod certificate;
mod connection;
mod context;
mod device;
mod edge;
mod hub;
mod hub_device;
mod iprange;
mod overlay;
mod proposal;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::model::EntityKind;
use crate::store::StoreKey;

pub use certificate::CertificateManager;
pub use connection::ConnectionManager;
pub use context::{Collaborators, ManagerContext};
pub use device::DeviceManager;
pub use hub::HubManager;
pub use hub_device::{HubDeviceLink, HubDeviceManager};
pub use iprange::IpRangeManager;
pub use overlay::OverlayManager;
pub use proposal::ProposalManager;

/// CRUD capability shared by every managed object kind.
///
/// `Parent` scopes the object: `()` for overlays, the overlay name (`str`)
/// for everything below an overlay.
#[async_trait]
pub trait EntityManager: Send + Sync {
    type Entity: Serialize + DeserializeOwned + Send + Sync;
    type Parent: ?Sized + Sync;

    fn kind(&self) -> EntityKind;

    fn store_key(&self, parent: &Self::Parent, name: &str) -> StoreKey;

    /// Create `entity`; fails with `AlreadyExists` if the name is taken.
    async fn create(&self, parent: &Self::Parent, entity: Self::Entity) -> Result<Self::Entity>;

    async fn get(&self, parent: &Self::Parent, name: &str) -> Result<Self::Entity>;

    async fn list(&self, parent: &Self::Parent) -> Result<Vec<Self::Entity>>;

    async fn update(
        &self,
        parent: &Self::Parent,
        name: &str,
        entity: Self::Entity,
    ) -> Result<Self::Entity>;

    /// Delete `name`. Deleting something that does not exist succeeds.
    async fn delete(&self, parent: &Self::Parent, name: &str) -> Result<()>;
}
