//! Hub-device link command handlers.

use meshwan_core::{HubDeviceLink, Orchestrator};
use tabled::Tabled;

use crate::cli::{GlobalOpts, HubDeviceArgs, HubDeviceCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Proxy Port")]
    proxy_port: u16,
    #[tabled(rename = "Data IP")]
    data_ip: String,
}

impl From<&HubDeviceLink> for LinkRow {
    fn from(l: &HubDeviceLink) -> Self {
        Self {
            device: l.device.clone(),
            proxy_port: l.proxy_port,
            data_ip: l.data_ip.clone().unwrap_or_default(),
        }
    }
}

pub async fn handle(
    orchestrator: &Orchestrator,
    args: HubDeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let overlay = util::overlay(global)?;
    let links = orchestrator.hub_devices();
    match args.command {
        HubDeviceCommand::List { hub } => {
            let all = links.list(overlay, &hub).await?;
            let out = output::render_list(
                global.output,
                &all,
                |l| LinkRow::from(l),
                |l| l.device.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        HubDeviceCommand::Connect { hub, device } => {
            let connection = links.connect(overlay, &hub, &device).await?;
            util::done(
                &format!(
                    "Device {device} linked to hub {hub} ({})",
                    connection.state
                ),
                global.quiet,
            );
            Ok(())
        }

        HubDeviceCommand::Disconnect { hub, device } => {
            if !util::confirm(
                &format!("Remove the tunnel between hub {hub} and device {device}?"),
                global.yes,
            )? {
                return Ok(());
            }
            links.disconnect(overlay, &hub, &device).await?;
            util::done(
                &format!("Device {device} unlinked from hub {hub}"),
                global.quiet,
            );
            Ok(())
        }
    }
}
