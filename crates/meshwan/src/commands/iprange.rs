//! IP range command handlers.

use meshwan_core::{EntityManager, IpRange, Orchestrator};
use tabled::Tabled;

use crate::cli::{GlobalOpts, IpRangeArgs, IpRangeCommand, IpRangeSpecArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct IpRangeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Subnet")]
    subnet: String,
    #[tabled(rename = "Min")]
    min: u8,
    #[tabled(rename = "Max")]
    max: u8,
    #[tabled(rename = "Used")]
    used: usize,
}

impl From<&IpRange> for IpRangeRow {
    fn from(r: &IpRange) -> Self {
        Self {
            name: r.name().to_owned(),
            subnet: r.spec.subnet.clone(),
            min: r.spec.min_ip,
            max: r.spec.max_ip,
            used: r.status.data.len(),
        }
    }
}

fn detail(r: &IpRange) -> String {
    let mut lines = vec![
        format!("Name:    {}", r.name()),
        format!("Subnet:  {}", r.spec.subnet),
        format!("Window:  .{} - .{}", r.spec.min_ip, r.spec.max_ip),
        format!("Used:    {}", r.status.data.len()),
    ];
    if let Ok([a, b, c]) = r.spec.base() {
        for (suffix, owner) in &r.status.data {
            lines.push(format!("  {a}.{b}.{c}.{suffix}  {owner}"));
        }
    }
    lines.join("\n")
}

fn build(name: String, spec: IpRangeSpecArgs) -> IpRange {
    let mut range = IpRange::new(name, spec.subnet, spec.min, spec.max);
    range.metadata.description = spec.description;
    range
}

pub async fn handle(
    orchestrator: &Orchestrator,
    args: IpRangeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let overlay = util::overlay(global)?;
    let ranges = orchestrator.ip_ranges();
    match args.command {
        IpRangeCommand::List => {
            orchestrator.overlays().get(&(), overlay).await?;
            let all = ranges.list(overlay).await?;
            let out = output::render_list(
                global.output,
                &all,
                |r| IpRangeRow::from(r),
                |r| r.name().to_owned(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        IpRangeCommand::Get { name } => {
            let range = ranges.get(overlay, &name).await?;
            let out =
                output::render_single(global.output, &range, detail, |r| r.name().to_owned());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        IpRangeCommand::Create { name, spec } => {
            let created = ranges.create(overlay, build(name, spec)).await?;
            util::done(&format!("IP range {} created", created.name()), global.quiet);
            Ok(())
        }

        IpRangeCommand::Update { name, spec } => {
            ranges.update(overlay, &name, build(name.clone(), spec)).await?;
            util::done(&format!("IP range {name} updated"), global.quiet);
            Ok(())
        }

        IpRangeCommand::Delete { name } => {
            if !util::confirm(&format!("Delete IP range {name}?"), global.yes)? {
                return Ok(());
            }
            ranges.delete(overlay, &name).await?;
            util::done(&format!("IP range {name} deleted"), global.quiet);
            Ok(())
        }

        IpRangeCommand::Allocate { owner } => {
            let ip = ranges.allocate(overlay, &owner).await?;
            output::print_output(&ip.to_string(), global.quiet);
            Ok(())
        }

        IpRangeCommand::Free { ip } => {
            ranges.free(overlay, &ip).await?;
            util::done(&format!("Released {ip}"), global.quiet);
            Ok(())
        }

        IpRangeCommand::FreeAll => {
            if !util::confirm(
                &format!("Release every address in overlay {overlay}?"),
                global.yes,
            )? {
                return Ok(());
            }
            ranges.free_all(overlay).await?;
            util::done("All addresses released", global.quiet);
            Ok(())
        }
    }
}
