// Collection names and key constructors for every persisted object.

use super::StoreKey;

pub const OVERLAYS: &str = "overlays";
pub const PROPOSALS: &str = "proposals";
pub const IP_RANGES: &str = "ipranges";
pub const HUBS: &str = "hubs";
pub const DEVICES: &str = "devices";
pub const CERTIFICATES: &str = "certificates";
pub const CONNECTIONS: &str = "connections";

pub fn overlay(name: &str) -> StoreKey {
    StoreKey::new().with("overlay", name)
}

/// Key of an object named `name` under `overlay`. Pass `""` as name to
/// list every child.
pub fn child(overlay: &str, field: &str, name: &str) -> StoreKey {
    StoreKey::new().with("overlay", overlay).with(field, name)
}

pub fn connection(overlay: &str, end1: &str, end2: &str) -> StoreKey {
    StoreKey::new()
        .with("overlay", overlay)
        .with("end1", end1)
        .with("end2", end2)
}
