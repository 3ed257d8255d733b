use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::connection::ConnectionManager;
use super::context::ManagerContext;
use super::device::DeviceManager;
use super::hub::HubManager;
use super::iprange::IpRangeManager;
use super::EntityManager;
use crate::error::{CoreError, Result};
use crate::model::connection::end_name;
use crate::model::{
    ConnectionEnd, ConnectionObject, EndpointOwner, EntityKind, RegistrationState, TopologyKind,
};

/// One device attached to a hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubDeviceLink {
    pub device: String,
    pub proxy_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_ip: Option<String>,
}

/// Hub-to-device links. Each link owns a data IP (allocated from the
/// overlay's ranges, owner `<device>@<hub>`) and a proxy port on the hub.
#[derive(Clone)]
pub struct HubDeviceManager {
    ctx: Arc<ManagerContext>,
}

impl HubDeviceManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    /// Attach `device_name` to `hub_name`.
    ///
    /// The proxy port is reserved under the hub's record lock, so links
    /// made concurrently for one hub never share or drop a port. A link
    /// whose tunnel is in `Error` or `Undeployed` is deployed again with
    /// the port and data IP it already holds.
    pub async fn connect(
        &self,
        overlay: &str,
        hub_name: &str,
        device_name: &str,
    ) -> Result<ConnectionObject> {
        let hubs = HubManager::new(self.ctx.clone());
        let devices = DeviceManager::new(self.ctx.clone());
        let hub = hubs.get(overlay, hub_name).await?;
        let device = devices.get(overlay, device_name).await?;

        for (kind, name, state) in [
            (EntityKind::Hub, hub_name, hub.status.registration),
            (EntityKind::Device, device_name, device.status.registration),
        ] {
            if state != RegistrationState::Success {
                return Err(CoreError::Conflict {
                    message: format!("{kind} '{name}' is not registered ({state})"),
                });
            }
        }

        let connections = ConnectionManager::new(self.ctx.clone());
        let hub_end = end_name(EntityKind::Hub, hub_name);
        let device_end = end_name(EntityKind::Device, device_name);
        let link_name = format!("{hub_end}<->{device_end}");
        if let Some(existing) = connections.get(overlay, &hub_end, &device_end).await? {
            if !existing.state.can_redeploy() {
                return Err(ManagerContext::already_exists(EntityKind::Connection, &link_name));
            }
            if hub.status.proxy_ports.contains_key(device_name)
                && device.status.data_ips.contains_key(hub_name)
            {
                return connections.redeploy(overlay, &hub_end, &device_end).await;
            }
            // Half-released link: start over.
            self.release_link(overlay, hub_name, device_name).await?;
            self.ctx
                .connection_store()
                .delete(overlay, &existing.end1.name, &existing.end2.name)
                .await?;
        }

        let requested = device.spec.proxy_hub_port;
        let mut port = 0;
        let hub = hubs
            .modify(overlay, hub_name, |hub| {
                if hub.status.proxy_ports.contains_key(device_name) {
                    return Err(ManagerContext::already_exists(
                        EntityKind::Connection,
                        &link_name,
                    ));
                }
                port = requested
                    .filter(|p| !hub.status.proxy_ports.values().any(|used| used == p))
                    .or_else(|| hub.next_proxy_port())
                    .ok_or_else(|| CoreError::Conflict {
                        message: format!("hub '{hub_name}' has no free proxy port"),
                    })?;
                hub.status.proxy_ports.insert(device_name.to_owned(), port);
                Ok(true)
            })
            .await?;

        let result = async {
            let ranges = IpRangeManager::new(self.ctx.clone());
            let ip = ranges
                .allocate(overlay, &format!("{device_name}@{hub_name}"))
                .await?
                .to_string();
            let device = match devices
                .modify(overlay, device_name, |device| {
                    device.status.data_ips.insert(hub_name.to_owned(), ip.clone());
                    Ok(true)
                })
                .await
            {
                Ok(device) => device,
                Err(e) => {
                    if let Err(free_err) = ranges.free(overlay, &ip).await {
                        warn!(overlay, %ip, error = %free_err, "could not release data IP");
                    }
                    return Err(e);
                }
            };

            let a = ConnectionEnd::new(EndpointOwner::Hub(hub.clone()))?;
            let b = ConnectionEnd::with_ip(EndpointOwner::Device(device), ip.as_str());
            let conn = connections
                .connect(overlay, a, b, TopologyKind::HubToDevice)
                .await?;
            Ok::<_, CoreError>((conn, ip))
        }
        .await;

        match result {
            Ok((conn, ip)) => {
                info!(overlay, hub = hub_name, device = device_name, %ip, port, "device attached to hub");
                Ok(conn)
            }
            Err(e) => {
                // Roll back so a retry starts from scratch.
                if let Err(cleanup) = self.release_link(overlay, hub_name, device_name).await {
                    warn!(overlay, hub = hub_name, device = device_name, error = %cleanup, "link rollback failed");
                }
                self.ctx
                    .connection_store()
                    .delete(overlay, &hub_end, &device_end)
                    .await?;
                Err(e)
            }
        }
    }

    /// Detach `device_name` from `hub_name`, undeploying the tunnel.
    pub async fn disconnect(&self, overlay: &str, hub_name: &str, device_name: &str) -> Result<()> {
        ConnectionManager::new(self.ctx.clone())
            .disconnect(
                overlay,
                &end_name(EntityKind::Hub, hub_name),
                &end_name(EntityKind::Device, device_name),
            )
            .await
    }

    /// Devices attached to `hub_name`.
    pub async fn list(&self, overlay: &str, hub_name: &str) -> Result<Vec<HubDeviceLink>> {
        let hub = HubManager::new(self.ctx.clone()).get(overlay, hub_name).await?;
        let devices = DeviceManager::new(self.ctx.clone());
        let mut links = Vec::with_capacity(hub.status.proxy_ports.len());
        for (device, port) in &hub.status.proxy_ports {
            let data_ip = match devices.get(overlay, device).await {
                Ok(d) => d.status.data_ips.get(hub_name).cloned(),
                Err(CoreError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            };
            links.push(HubDeviceLink {
                device: device.clone(),
                proxy_port: *port,
                data_ip,
            });
        }
        Ok(links)
    }

    /// Give back the proxy port and data IP held by a hub-device link.
    /// Either side may already be gone.
    pub(crate) async fn release_link(
        &self,
        overlay: &str,
        hub_name: &str,
        device_name: &str,
    ) -> Result<()> {
        match HubManager::new(self.ctx.clone())
            .modify(overlay, hub_name, |hub| {
                Ok(hub.status.proxy_ports.remove(device_name).is_some())
            })
            .await
        {
            Ok(_) | Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let mut released = None;
        match DeviceManager::new(self.ctx.clone())
            .modify(overlay, device_name, |device| {
                released = device.status.data_ips.remove(hub_name);
                Ok(released.is_some())
            })
            .await
        {
            Ok(_) | Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        if let Some(ip) = released {
            match IpRangeManager::new(self.ctx.clone()).free(overlay, &ip).await {
                Ok(()) | Err(CoreError::NotAllocated { .. } | CoreError::OutOfRange { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
