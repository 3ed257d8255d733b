//! Overlay command handlers.

use meshwan_core::{EntityManager, Overlay, Orchestrator};
use tabled::Tabled;

use crate::cli::{GlobalOpts, OverlayArgs, OverlayCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct OverlayRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "CA Certificate")]
    cert: String,
    #[tabled(rename = "Issuer")]
    issuer: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Overlay> for OverlayRow {
    fn from(o: &Overlay) -> Self {
        Self {
            name: o.name().to_owned(),
            cert: o.status.cert_name.clone(),
            issuer: o.status.issuer_name.clone(),
            description: o.metadata.description.clone().unwrap_or_default(),
        }
    }
}

fn detail(o: &Overlay) -> String {
    [
        format!("Name:        {}", o.name()),
        format!(
            "Description: {}",
            o.metadata.description.as_deref().unwrap_or("-")
        ),
        format!("CA cert:     {}", o.status.cert_name),
        format!("Issuer:      {}", o.status.issuer_name),
    ]
    .join("\n")
}

pub async fn handle(
    orchestrator: &Orchestrator,
    args: OverlayArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let overlays = orchestrator.overlays();
    match args.command {
        OverlayCommand::List => {
            let all = overlays.list(&()).await?;
            let out = output::render_list(global.output, &all, |o| OverlayRow::from(o), |o| {
                o.name().to_owned()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        OverlayCommand::Get { name } => {
            let overlay = overlays.get(&(), &name).await?;
            let out = output::render_single(global.output, &overlay, detail, |o| {
                o.name().to_owned()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        OverlayCommand::Create { name, description } => {
            let mut overlay = Overlay::new(name);
            overlay.metadata.description = description;
            let created = overlays.create(&(), overlay).await?;
            util::done(
                &format!(
                    "Overlay {} created with CA {}",
                    created.name(),
                    created.status.cert_name
                ),
                global.quiet,
            );
            Ok(())
        }

        OverlayCommand::Update { name, description } => {
            let mut overlay = overlays.get(&(), &name).await?;
            overlay.metadata.description = description;
            overlays.update(&(), &name, overlay).await?;
            util::done(&format!("Overlay {name} updated"), global.quiet);
            Ok(())
        }

        OverlayCommand::Delete { name } => {
            if !util::confirm(&format!("Delete overlay {name} and its CA?"), global.yes)? {
                return Ok(());
            }
            overlays.delete(&(), &name).await?;
            util::done(&format!("Overlay {name} deleted"), global.quiet);
            Ok(())
        }
    }
}
