//! Long-running registration poller.

use meshwan_core::Orchestrator;
use tracing::info;

use crate::cli::GlobalOpts;
use crate::error::CliError;

use super::util;

/// Resume every pending registration, then run until Ctrl-C.
pub async fn handle(orchestrator: &Orchestrator, global: &GlobalOpts) -> Result<(), CliError> {
    let resumed = orchestrator.resume_registrations().await?;
    util::done(
        &format!("Polling {resumed} pending registration(s); press Ctrl-C to stop"),
        global.quiet,
    );

    tokio::signal::ctrl_c().await?;
    info!("interrupted, stopping registration pollers");
    Ok(())
}
