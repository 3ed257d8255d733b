//! Connection command handlers.

use meshwan_core::{ConnectionObject, Orchestrator};
use tabled::Tabled;

use crate::cli::{ConnectionArgs, ConnectionCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "End 1")]
    end1: String,
    #[tabled(rename = "End 2")]
    end2: String,
    #[tabled(rename = "Topology")]
    topology: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Resources")]
    resources: usize,
}

/// With `focus` set, End 1 is the focused endpoint and End 2 its peer.
fn row(c: &ConnectionObject, focus: Option<&str>, color: bool) -> ConnectionRow {
    let (end1, end2) = match focus.and_then(|name| c.peer_of(name).map(|peer| (name, peer))) {
        Some((name, peer)) => (name.to_owned(), peer.name.clone()),
        None => (c.end1.name.clone(), c.end2.name.clone()),
    };
    ConnectionRow {
        end1,
        end2,
        topology: c.topology.to_string(),
        state: output::connection_cell(c.state, color),
        resources: c.resources.len(),
    }
}

fn id(c: &ConnectionObject) -> String {
    format!("{} {}", c.end1.name, c.end2.name)
}

fn detail(c: &ConnectionObject) -> String {
    let mut lines = vec![
        format!("Overlay:    {}", c.overlay),
        format!("Topology:   {}", c.topology),
        format!("End 1:      {} ({})", c.end1.name, c.end1.ip),
        format!("End 2:      {} ({})", c.end2.name, c.end2.ip),
        format!("State:      {}", c.state),
        format!(
            "Deployment: {}",
            c.deployment_id.as_deref().unwrap_or("-")
        ),
    ];
    if let Some(ref error) = c.error {
        lines.push(format!("Error:      {error}"));
    }
    if let Some(at) = c.updated_at {
        lines.push(format!("Updated:    {}", at.to_rfc3339()));
    }
    lines.push("Resources:".into());
    for r in &c.resources {
        let shared = if r.reserved { " (shared)" } else { "" };
        lines.push(format!(
            "  {:<14} {:<28} on {}{shared}",
            r.kind,
            r.name,
            r.target.name()
        ));
    }
    lines.join("\n")
}

pub async fn handle(
    orchestrator: &Orchestrator,
    args: ConnectionArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let overlay = util::overlay(global)?;
    let connections = orchestrator.connections();
    match args.command {
        ConnectionCommand::List { endpoint } => {
            let all = match endpoint {
                Some(ref endpoint) => connections.list_by_endpoint(overlay, endpoint).await?,
                None => connections.list(overlay).await?,
            };
            let color = output::should_color(global.color);
            let out = output::render_list(
                global.output,
                &all,
                |c| row(c, endpoint.as_deref(), color),
                id,
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConnectionCommand::Get { end1, end2 } => {
            let connection = connections
                .get(overlay, &end1, &end2)
                .await?
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "Connection".into(),
                    identifier: format!("{end1} <-> {end2}"),
                    list_command: "connection list".into(),
                })?;
            let out = output::render_single(global.output, &connection, detail, id);
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConnectionCommand::Redeploy { end1, end2 } => {
            let connection = connections.redeploy(overlay, &end1, &end2).await?;
            util::done(
                &format!("Redeployed {end1} <-> {end2} ({})", connection.state),
                global.quiet,
            );
            Ok(())
        }

        ConnectionCommand::Disconnect { end1, end2 } => {
            if !util::confirm(
                &format!("Undeploy the tunnel between {end1} and {end2}?"),
                global.yes,
            )? {
                return Ok(());
            }
            connections.disconnect(overlay, &end1, &end2).await?;
            util::done(&format!("Disconnected {end1} <-> {end2}"), global.quiet);
            Ok(())
        }
    }
}
