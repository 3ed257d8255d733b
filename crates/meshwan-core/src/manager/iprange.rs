use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::EntityManager;
use super::context::ManagerContext;
use crate::error::{CoreError, Result};
use crate::model::{EntityKind, IpRange, IpRangeStatus, validate_name};
use crate::store::{StoreKey, keys};

/// IP ranges of an overlay and the addresses handed out from them.
///
/// Every mutation of an overlay's ranges runs under that overlay's
/// allocation lock so two callers never receive the same address.
#[derive(Clone)]
pub struct IpRangeManager {
    ctx: Arc<ManagerContext>,
}

impl IpRangeManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    async fn ranges(&self, overlay: &str) -> Result<Vec<IpRange>> {
        self.ctx
            .store
            .list(keys::IP_RANGES, &self.store_key(overlay, ""))
            .await
    }

    async fn save(&self, overlay: &str, range: &IpRange) -> Result<()> {
        self.ctx
            .store
            .put(keys::IP_RANGES, &self.store_key(overlay, range.name()), range)
            .await
    }

    fn check_conflicts(range: &IpRange, existing: &[IpRange]) -> Result<()> {
        if let Some(other) = existing
            .iter()
            .find(|other| other.name() != range.name() && range.is_conflict(other))
        {
            return Err(CoreError::Conflict {
                message: format!(
                    "ip range '{}' overlaps '{}'",
                    range.name(),
                    other.name()
                ),
            });
        }
        Ok(())
    }

    /// Hand out the lowest free address across the overlay's ranges.
    pub async fn allocate(&self, overlay: &str, owner: &str) -> Result<Ipv4Addr> {
        let lock = self.ctx.overlay_lock(overlay);
        let _guard = lock.lock().await;

        for mut range in self.ranges(overlay).await? {
            match range.allocate(overlay, owner) {
                Ok(ip) => {
                    self.save(overlay, &range).await?;
                    debug!(overlay, range = %range.name(), %ip, owner, "ip allocated");
                    return Ok(ip);
                }
                Err(CoreError::NoAvailableIp { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::NoAvailableIp {
            overlay: overlay.to_owned(),
        })
    }

    /// Return `ip` to whichever range holds it.
    pub async fn free(&self, overlay: &str, ip: &str) -> Result<()> {
        let lock = self.ctx.overlay_lock(overlay);
        let _guard = lock.lock().await;

        let mut range = self
            .ranges(overlay)
            .await?
            .into_iter()
            .find(|r| r.contains(ip))
            .ok_or_else(|| CoreError::OutOfRange { ip: ip.to_owned() })?;
        range.free(ip)?;
        self.save(overlay, &range).await?;
        debug!(overlay, range = %range.name(), ip, "ip released");
        Ok(())
    }

    /// Release every allocation in every range of `overlay`.
    pub async fn free_all(&self, overlay: &str) -> Result<()> {
        let lock = self.ctx.overlay_lock(overlay);
        let _guard = lock.lock().await;

        for mut range in self.ranges(overlay).await? {
            range.free_all();
            self.save(overlay, &range).await?;
        }
        info!(overlay, "all ip allocations released");
        Ok(())
    }
}

#[async_trait]
impl EntityManager for IpRangeManager {
    type Entity = IpRange;
    type Parent = str;

    fn kind(&self) -> EntityKind {
        EntityKind::IpRange
    }

    fn store_key(&self, overlay: &str, name: &str) -> StoreKey {
        keys::child(overlay, "iprange", name)
    }

    async fn create(&self, overlay: &str, mut range: IpRange) -> Result<IpRange> {
        self.ctx.require_overlay(overlay).await?;
        validate_name(self.kind(), range.name())?;
        range.spec.validate()?;
        range.status = IpRangeStatus::default();

        let lock = self.ctx.overlay_lock(overlay);
        let _guard = lock.lock().await;

        let existing = self.ranges(overlay).await?;
        if existing.iter().any(|r| r.name() == range.name()) {
            return Err(ManagerContext::already_exists(self.kind(), range.name()));
        }
        Self::check_conflicts(&range, &existing)?;
        self.save(overlay, &range).await?;
        info!(overlay, range = %range.name(), subnet = %range.spec.subnet, "ip range created");
        Ok(range)
    }

    async fn get(&self, overlay: &str, name: &str) -> Result<IpRange> {
        self.ctx
            .load(keys::IP_RANGES, &self.store_key(overlay, name), self.kind(), name)
            .await
    }

    async fn list(&self, overlay: &str) -> Result<Vec<IpRange>> {
        self.ranges(overlay).await
    }

    async fn update(&self, overlay: &str, name: &str, range: IpRange) -> Result<IpRange> {
        if range.name() != name {
            return Err(CoreError::validation(format!(
                "name '{}' does not match '{name}'",
                range.name()
            )));
        }
        range.spec.validate()?;

        let lock = self.ctx.overlay_lock(overlay);
        let _guard = lock.lock().await;

        let mut current = self.get(overlay, name).await?;
        if current.in_use() && current.spec != range.spec {
            return Err(CoreError::InUse {
                kind: self.kind(),
                name: name.to_owned(),
            });
        }
        current.metadata.description = range.metadata.description;
        current.spec = range.spec;
        Self::check_conflicts(&current, &self.ranges(overlay).await?)?;
        self.save(overlay, &current).await?;
        Ok(current)
    }

    async fn delete(&self, overlay: &str, name: &str) -> Result<()> {
        let lock = self.ctx.overlay_lock(overlay);
        let _guard = lock.lock().await;

        let key = self.store_key(overlay, name);
        let Some(range) = self.ctx.store.get::<IpRange>(keys::IP_RANGES, &key).await? else {
            return Ok(());
        };
        if range.in_use() {
            return Err(CoreError::InUse {
                kind: self.kind(),
                name: name.to_owned(),
            });
        }
        self.ctx.store.delete(keys::IP_RANGES, &key).await
    }
}
