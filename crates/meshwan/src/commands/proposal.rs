//! Crypto proposal command handlers.

use meshwan_core::{EntityManager, Orchestrator, Proposal};
use tabled::Tabled;

use crate::cli::{GlobalOpts, ProposalArgs, ProposalCommand, ProposalSpecArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct ProposalRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Encryption")]
    encryption: String,
    #[tabled(rename = "Hash")]
    hash: String,
    #[tabled(rename = "DH Group")]
    dh_group: String,
}

impl From<&Proposal> for ProposalRow {
    fn from(p: &Proposal) -> Self {
        Self {
            name: p.name().to_owned(),
            encryption: p.spec.encryption.clone(),
            hash: p.spec.hash.clone(),
            dh_group: p.spec.dh_group.clone(),
        }
    }
}

fn detail(p: &Proposal) -> String {
    [
        format!("Name:        {}", p.name()),
        format!(
            "Description: {}",
            p.metadata.description.as_deref().unwrap_or("-")
        ),
        format!("Encryption:  {}", p.spec.encryption),
        format!("Hash:        {}", p.spec.hash),
        format!("DH group:    {}", p.spec.dh_group),
    ]
    .join("\n")
}

fn build(name: String, spec: ProposalSpecArgs) -> Proposal {
    let mut proposal = Proposal::new(name, spec.encryption, spec.hash, spec.dh_group);
    proposal.metadata.description = spec.description;
    proposal
}

pub async fn handle(
    orchestrator: &Orchestrator,
    args: ProposalArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let overlay = util::overlay(global)?;
    let proposals = orchestrator.proposals();
    match args.command {
        ProposalCommand::List => {
            orchestrator.overlays().get(&(), overlay).await?;
            let all = proposals.list(overlay).await?;
            let out = output::render_list(
                global.output,
                &all,
                |p| ProposalRow::from(p),
                |p| p.name().to_owned(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProposalCommand::Get { name } => {
            let proposal = proposals.get(overlay, &name).await?;
            let out = output::render_single(global.output, &proposal, detail, |p| {
                p.name().to_owned()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProposalCommand::Create { name, spec } => {
            let created = proposals.create(overlay, build(name, spec)).await?;
            util::done(&format!("Proposal {} created", created.name()), global.quiet);
            Ok(())
        }

        ProposalCommand::Update { name, spec } => {
            proposals
                .update(overlay, &name, build(name.clone(), spec))
                .await?;
            util::done(&format!("Proposal {name} updated"), global.quiet);
            Ok(())
        }

        ProposalCommand::Delete { name } => {
            if !util::confirm(&format!("Delete proposal {name}?"), global.yes)? {
                return Ok(());
            }
            proposals.delete(overlay, &name).await?;
            util::done(&format!("Proposal {name} deleted"), global.quiet);
            Ok(())
        }
    }
}
