//! Device command handlers.

use meshwan_core::{Device, DeviceSpec, EntityManager, Orchestrator};
use tabled::Tabled;

use crate::cli::{DeviceArgs, DeviceCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::{self, EdgeSpec};

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Registration")]
    registration: String,
    #[tabled(rename = "Proxy Hub")]
    proxy_hub: String,
}

fn row(d: &Device, color: bool) -> DeviceRow {
    DeviceRow {
        name: d.name().to_owned(),
        mode: d.status.mode.map(|m| m.to_string()).unwrap_or_default(),
        ip: d.status.ip.clone(),
        registration: output::registration_cell(d.status.registration, color),
        proxy_hub: d.spec.proxy_hub.clone().unwrap_or_default(),
    }
}

fn detail(d: &Device) -> String {
    let mut lines = vec![
        format!("Name:          {}", d.name()),
        format!(
            "Description:   {}",
            d.metadata.description.as_deref().unwrap_or("-")
        ),
        format!("Public IPs:    {}", d.spec.public_ips.join(", ")),
        format!(
            "Mode:          {}",
            d.status.mode.map_or_else(|| "-".into(), |m| m.to_string())
        ),
        format!("IP:            {}", d.status.ip),
        format!("Certificate:   {}", d.status.cert_name),
        format!("Registration:  {}", d.status.registration),
        format!("Hub only:      {}", d.spec.force_hub_connectivity),
        format!(
            "Proxy hub:     {}",
            d.spec.proxy_hub.as_deref().unwrap_or("-")
        ),
    ];
    if let Some(ref message) = d.status.message {
        lines.push(format!("Message:       {message}"));
    }
    if let Some(ref scc) = d.status.scc_resource {
        lines.push(format!("SCC resource:  {}", scc.name));
    }
    for (hub, ip) in &d.status.data_ips {
        lines.push(format!("  data ip {ip}  via {hub}"));
    }
    lines.join("\n")
}

pub async fn handle(
    orchestrator: &Orchestrator,
    args: DeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let overlay = util::overlay(global)?;
    let devices = orchestrator.devices();
    match args.command {
        DeviceCommand::List => {
            orchestrator.overlays().get(&(), overlay).await?;
            let all = devices.list(overlay).await?;
            let color = output::should_color(global.color);
            let out = output::render_list(
                global.output,
                &all,
                |d| row(d, color),
                |d| d.name().to_owned(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DeviceCommand::Get { name } => {
            let device = devices.get(overlay, &name).await?;
            let out =
                output::render_single(global.output, &device, detail, |d| d.name().to_owned());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DeviceCommand::Create {
            name,
            edge,
            force_hub_connectivity,
            proxy_hub,
            proxy_hub_port,
            from_file,
        } => {
            let device = if let Some(ref path) = from_file {
                let mut device: Device = util::read_json_file(path)?;
                device.metadata.name = name;
                device
            } else {
                let spec = EdgeSpec::from_args(&edge)?;
                let mut device = Device::new(
                    name,
                    DeviceSpec {
                        public_ips: spec.public_ips,
                        force_hub_connectivity,
                        proxy_hub,
                        proxy_hub_port,
                        kube_config: spec.kube_config,
                        git_ops_param: spec.git_ops_param,
                    },
                );
                device.metadata.description.clone_from(&edge.description);
                device
            };

            let created = devices.create(overlay, device).await?;
            let name = created.name().to_owned();
            let mode = created.status.mode.map_or_else(|| "-".into(), |m| m.to_string());
            util::done(
                &format!("Device {name} created in mode {mode}, registration pending"),
                global.quiet,
            );

            if edge.wait {
                util::wait_for_registration(
                    &format!("device {name}"),
                    edge.wait_timeout,
                    global.quiet,
                    || async {
                        let device = devices.get(overlay, &name).await?;
                        Ok::<_, CliError>((device.status.registration, device.status.message))
                    },
                )
                .await?;
            }
            Ok(())
        }

        DeviceCommand::Update { name, description } => {
            let mut device = devices.get(overlay, &name).await?;
            device.metadata.description = description;
            devices.update(overlay, &name, device).await?;
            util::done(&format!("Device {name} updated"), global.quiet);
            Ok(())
        }

        DeviceCommand::Delete { name } => {
            if !util::confirm(
                &format!("Delete device {name}, its tunnels and its certificate?"),
                global.yes,
            )? {
                return Ok(());
            }
            devices.delete(overlay, &name).await?;
            util::done(&format!("Device {name} deleted"), global.quiet);
            Ok(())
        }
    }
}
