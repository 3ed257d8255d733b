//! Hub command handlers.

use meshwan_core::{EntityManager, Hub, HubSpec, Orchestrator};
use tabled::Tabled;

use crate::cli::{GlobalOpts, HubArgs, HubCommand};
use crate::error::CliError;
use crate::output;

use super::util::{self, EdgeSpec};

#[derive(Tabled)]
struct HubRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Registration")]
    registration: String,
    #[tabled(rename = "Devices")]
    devices: usize,
}

fn row(h: &Hub, color: bool) -> HubRow {
    HubRow {
        name: h.name().to_owned(),
        mode: h.status.mode.map(|m| m.to_string()).unwrap_or_default(),
        ip: h.status.ip.clone(),
        registration: output::registration_cell(h.status.registration, color),
        devices: h.status.proxy_ports.len(),
    }
}

fn detail(h: &Hub) -> String {
    let mut lines = vec![
        format!("Name:         {}", h.name()),
        format!(
            "Description:  {}",
            h.metadata.description.as_deref().unwrap_or("-")
        ),
        format!("Public IPs:   {}", h.spec.public_ips.join(", ")),
        format!(
            "Mode:         {}",
            h.status.mode.map_or_else(|| "-".into(), |m| m.to_string())
        ),
        format!("IP:           {}", h.status.ip),
        format!("Certificate:  {}", h.status.cert_name),
        format!("Registration: {}", h.status.registration),
    ];
    if let Some(ref message) = h.status.message {
        lines.push(format!("Message:      {message}"));
    }
    if let Some(at) = h.status.registered_at {
        lines.push(format!("Registered:   {}", at.to_rfc3339()));
    }
    for (device, port) in &h.status.proxy_ports {
        lines.push(format!("  proxy :{port}  {device}"));
    }
    lines.join("\n")
}

pub async fn handle(
    orchestrator: &Orchestrator,
    args: HubArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let overlay = util::overlay(global)?;
    let hubs = orchestrator.hubs();
    match args.command {
        HubCommand::List => {
            orchestrator.overlays().get(&(), overlay).await?;
            let all = hubs.list(overlay).await?;
            let color = output::should_color(global.color);
            let out = output::render_list(
                global.output,
                &all,
                |h| row(h, color),
                |h| h.name().to_owned(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        HubCommand::Get { name } => {
            let hub = hubs.get(overlay, &name).await?;
            let out = output::render_single(global.output, &hub, detail, |h| h.name().to_owned());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        HubCommand::Create {
            name,
            edge,
            from_file,
        } => {
            let hub = if let Some(ref path) = from_file {
                let mut hub: Hub = util::read_json_file(path)?;
                hub.metadata.name = name;
                hub
            } else {
                let spec = EdgeSpec::from_args(&edge)?;
                let mut hub = Hub::new(
                    name,
                    HubSpec {
                        public_ips: spec.public_ips,
                        kube_config: spec.kube_config,
                        git_ops_param: spec.git_ops_param,
                    },
                );
                hub.metadata.description.clone_from(&edge.description);
                hub
            };

            let created = hubs.create(overlay, hub).await?;
            let name = created.name().to_owned();
            util::done(
                &format!("Hub {name} created, registration pending"),
                global.quiet,
            );

            if edge.wait {
                util::wait_for_registration(
                    &format!("hub {name}"),
                    edge.wait_timeout,
                    global.quiet,
                    || async {
                        let hub = hubs.get(overlay, &name).await?;
                        Ok::<_, CliError>((hub.status.registration, hub.status.message))
                    },
                )
                .await?;
            }
            Ok(())
        }

        HubCommand::Update { name, description } => {
            let mut hub = hubs.get(overlay, &name).await?;
            hub.metadata.description = description;
            hubs.update(overlay, &name, hub).await?;
            util::done(&format!("Hub {name} updated"), global.quiet);
            Ok(())
        }

        HubCommand::Delete { name } => {
            if !util::confirm(
                &format!("Delete hub {name}, its tunnels and its certificate?"),
                global.yes,
            )? {
                return Ok(());
            }
            hubs.delete(overlay, &name).await?;
            util::done(&format!("Hub {name} deleted"), global.quiet);
            Ok(())
        }
    }
}
