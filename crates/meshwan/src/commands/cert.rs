//! Certificate command handlers.

use meshwan_core::{
    CertificateObject, CertificateSpec, ChainSelector, ClusterType, EntityManager, Metadata,
    Orchestrator,
};
use tabled::Tabled;

use crate::cli::{CertArgs, CertCommand, CertType, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct CertRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    cluster_type: String,
    #[tabled(rename = "CA")]
    is_ca: bool,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&CertificateObject> for CertRow {
    fn from(c: &CertificateObject) -> Self {
        Self {
            name: c.metadata.name.clone(),
            cluster_type: c.spec.cluster_type.to_string(),
            is_ca: c.spec.is_ca,
            description: c.metadata.description.clone().unwrap_or_default(),
        }
    }
}

/// Table view prints the PEM blocks so they can be piped into files.
fn detail(c: &CertificateObject) -> String {
    let mut lines = vec![
        format!("Name: {}", c.metadata.name),
        format!("Type: {}", c.spec.cluster_type),
        format!("CA:   {}", c.spec.is_ca),
    ];
    if let Some(ref data) = c.data {
        lines.push(String::new());
        lines.push(data.cert.trim_end().to_owned());
        lines.push(data.ca.trim_end().to_owned());
    }
    lines.join("\n")
}

fn cluster_type(t: CertType) -> ClusterType {
    match t {
        CertType::Overlay => ClusterType::Overlay,
        CertType::Hub => ClusterType::Hub,
        CertType::Device => ClusterType::Device,
    }
}

pub async fn handle(
    orchestrator: &Orchestrator,
    args: CertArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let overlay = util::overlay(global)?;
    let certs = orchestrator.certificates();
    match args.command {
        CertCommand::List => {
            orchestrator.overlays().get(&(), overlay).await?;
            let all = certs.list(overlay).await?;
            let out = output::render_list(
                global.output,
                &all,
                |c| CertRow::from(c),
                |c| c.metadata.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CertCommand::Get { name } => {
            let cert = certs.get(overlay, &name).await?;
            let out = output::render_single(global.output, &cert, detail, |c| {
                c.metadata.name.clone()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CertCommand::Create {
            name,
            cluster_type: kind,
            ca,
            description,
        } => {
            let cert = CertificateObject {
                metadata: Metadata { name, description },
                spec: CertificateSpec {
                    cluster_type: cluster_type(kind),
                    is_ca: ca,
                },
                data: None,
            };
            let created = certs.create(overlay, cert).await?;
            util::done(
                &format!("Certificate {} issued", created.metadata.name),
                global.quiet,
            );
            Ok(())
        }

        CertCommand::Delete { name } => {
            if !util::confirm(&format!("Delete certificate {name}?"), global.yes)? {
                return Ok(());
            }
            certs.delete(overlay, &name).await?;
            util::done(&format!("Certificate {name} deleted"), global.quiet);
            Ok(())
        }

        CertCommand::Chain { hub, device } => {
            let chain = certs
                .chain(&ChainSelector {
                    overlay: Some(overlay.to_owned()),
                    hub,
                    device,
                })
                .await?;
            output::print_output(&chain, global.quiet);
            Ok(())
        }
    }
}
