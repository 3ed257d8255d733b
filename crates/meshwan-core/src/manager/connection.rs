use std::sync::Arc;

use meshwan_api::sync::models::ResourceAction;
use tracing::{info, warn};

use super::context::ManagerContext;
use super::hub_device::HubDeviceManager;
use crate::deploy::{ClusterId, ResUtil};
use crate::error::{CoreError, Result};
use crate::model::{
    ConnectionEnd, ConnectionObject, ConnectionState, EntityKind, TopologyKind,
};

/// Lifecycle of tunnels between hubs and devices.
///
/// `connect` builds and deploys both ends as one unit; `disconnect`
/// removes the per-connection resources and leaves the shared proposals
/// in place.
#[derive(Clone)]
pub struct ConnectionManager {
    ctx: Arc<ManagerContext>,
}

impl ConnectionManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    fn unit_name(conn: &ConnectionObject) -> String {
        format!(
            "{}-{}-{}",
            conn.overlay,
            conn.end1.name.to_lowercase().replace('.', "-"),
            conn.end2.name.to_lowercase().replace('.', "-")
        )
    }

    pub async fn get(&self, overlay: &str, a: &str, b: &str) -> Result<Option<ConnectionObject>> {
        self.ctx.connection_store().get(overlay, a, b).await
    }

    pub async fn list(&self, overlay: &str) -> Result<Vec<ConnectionObject>> {
        self.ctx.connection_store().list_by_overlay(overlay).await
    }

    /// Connections with `endpoint` (an end name such as `Hub.h1`) at either end.
    pub async fn list_by_endpoint(
        &self,
        overlay: &str,
        endpoint: &str,
    ) -> Result<Vec<ConnectionObject>> {
        self.ctx
            .connection_store()
            .list_by_endpoint(overlay, endpoint)
            .await
    }

    /// Build, record and deploy a connection between `a` and `b`.
    ///
    /// A failed deployment leaves the record in `Error` state. Calling
    /// `connect` again for an `Error` or `Undeployed` record rebuilds it
    /// from the supplied ends and deploys it again.
    pub async fn connect(
        &self,
        overlay: &str,
        a: ConnectionEnd,
        b: ConnectionEnd,
        topology: TopologyKind,
    ) -> Result<ConnectionObject> {
        let store = self.ctx.connection_store();
        if let Some(existing) = store.get(overlay, &a.name, &b.name).await? {
            if !existing.state.can_redeploy() {
                return Err(ManagerContext::already_exists(
                    EntityKind::Connection,
                    &format!("{}<->{}", a.name, b.name),
                ));
            }
            info!(
                overlay,
                end1 = %existing.end1.name,
                end2 = %existing.end2.name,
                state = %existing.state,
                "rebuilding connection"
            );
            // The rebuilt record may store its ends in the other order.
            store
                .delete(overlay, &existing.end1.name, &existing.end2.name)
                .await?;
        }

        let mut conn = self
            .ctx
            .topology()
            .build_connection(overlay, a, b, topology)
            .await?;
        store.upsert(&conn).await?;
        self.deploy(&mut conn).await?;
        Ok(conn)
    }

    /// Deploy the stored resources of the connection between `a` and `b`
    /// again, e.g. after a sync-service failure left it in `Error`.
    pub async fn redeploy(&self, overlay: &str, a: &str, b: &str) -> Result<ConnectionObject> {
        let mut conn = self
            .ctx
            .connection_store()
            .get(overlay, a, b)
            .await?
            .ok_or_else(|| CoreError::not_found(EntityKind::Connection, format!("{a}<->{b}")))?;
        self.deploy(&mut conn).await?;
        Ok(conn)
    }

    /// Install every resource of `conn` as one unit and record the outcome.
    async fn deploy(&self, conn: &mut ConnectionObject) -> Result<()> {
        let store = self.ctx.connection_store();
        let mut res = self.ctx.res_util();
        for r in &conn.resources {
            res.add_resource(
                &ClusterId::for_owner(&conn.overlay, &r.target),
                ResourceAction::Create,
                r.resource.clone(),
            );
        }

        match res.deploy(&Self::unit_name(conn)).await {
            Ok(id) => {
                conn.deployment_id = Some(id);
                conn.mark(ConnectionState::Deployed, None);
                store.upsert(conn).await?;
                info!(
                    overlay = %conn.overlay,
                    end1 = %conn.end1.name,
                    end2 = %conn.end2.name,
                    topology = %conn.topology,
                    "connection deployed"
                );
                Ok(())
            }
            Err(e) => {
                conn.mark(ConnectionState::Error, Some(e.to_string()));
                store.upsert(conn).await?;
                Err(e)
            }
        }
    }

    /// Undeploy the connection between `a` and `b` (either order) and
    /// drop its record. A missing connection is not an error.
    pub async fn disconnect(&self, overlay: &str, a: &str, b: &str) -> Result<()> {
        let store = self.ctx.connection_store();
        let Some(mut conn) = store.get(overlay, a, b).await? else {
            return Ok(());
        };

        // Only a connection that was once installed has anything to remove.
        if conn.deployment_id.is_some() && conn.state != ConnectionState::Undeployed {
            let res = Self::teardown_unit(&self.ctx, &conn);
            if let Err(e) = res.undeploy(&Self::unit_name(&conn)).await {
                conn.mark(ConnectionState::Error, Some(e.to_string()));
                store.upsert(&conn).await?;
                return Err(e);
            }
            conn.mark(ConnectionState::Undeployed, None);
            store.upsert(&conn).await?;
        }

        if conn.topology == TopologyKind::HubToDevice {
            HubDeviceManager::new(self.ctx.clone())
                .release_link(overlay, conn.end1.owner.name(), conn.end2.owner.name())
                .await?;
        }

        store.delete(overlay, &conn.end1.name, &conn.end2.name).await?;
        info!(overlay, end1 = %conn.end1.name, end2 = %conn.end2.name, "connection removed");
        Ok(())
    }

    /// Disconnect everything attached to `endpoint`. Every connection is
    /// attempted; the first failure is returned.
    pub async fn disconnect_all(&self, overlay: &str, endpoint: &str) -> Result<()> {
        let mut first_error: Option<CoreError> = None;
        for conn in self.list_by_endpoint(overlay, endpoint).await? {
            if let Err(e) = self
                .disconnect(overlay, &conn.end1.name, &conn.end2.name)
                .await
            {
                warn!(
                    overlay,
                    end1 = %conn.end1.name,
                    end2 = %conn.end2.name,
                    error = %e,
                    "disconnect failed"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn teardown_unit(ctx: &ManagerContext, conn: &ConnectionObject) -> ResUtil {
        let mut res = ctx.res_util();
        for r in conn.resources.iter().filter(|r| !r.reserved) {
            res.add_resource(
                &ClusterId::for_owner(&conn.overlay, &r.target),
                ResourceAction::Delete,
                r.resource.clone(),
            );
        }
        res
    }
}
