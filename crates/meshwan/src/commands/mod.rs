//! Command dispatch: routes parsed CLI commands to their handlers.

pub mod cert;
pub mod config_cmd;
pub mod connection;
pub mod device;
pub mod hub;
pub mod hub_device;
pub mod iprange;
pub mod overlay;
pub mod proposal;
pub mod util;
pub mod watch;

use meshwan_core::Orchestrator;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a parsed command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    orchestrator: &Orchestrator,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Overlay(args) => overlay::handle(orchestrator, args, global).await,
        Command::Proposal(args) => proposal::handle(orchestrator, args, global).await,
        Command::Iprange(args) => iprange::handle(orchestrator, args, global).await,
        Command::Hub(args) => hub::handle(orchestrator, args, global).await,
        Command::Device(args) => device::handle(orchestrator, args, global).await,
        Command::HubDevice(args) => hub_device::handle(orchestrator, args, global).await,
        Command::Connection(args) => connection::handle(orchestrator, args, global).await,
        Command::Cert(args) => cert::handle(orchestrator, args, global).await,
        Command::Watch => watch::handle(orchestrator, global).await,

        // Handled in main before an orchestrator is built
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
