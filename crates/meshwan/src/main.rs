mod cli;
mod commands;
mod error;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use meshwan_api::{IssuerClient, ReachabilityProbe, SyncClient};
use meshwan_config::Config;
use meshwan_core::{Collaborators, FileStore, Orchestrator};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, GlobalOpts, LogFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't touch the state file or the collaborators
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "meshwan", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = load_config(&cli.global)?;
            let orchestrator = build_orchestrator(&cfg, &cli.global).await?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &orchestrator, &cli.global).await;
            orchestrator.shutdown().await;
            result
        }
    }
}

pub(crate) fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(meshwan_config::config_path)
}

pub(crate) fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(meshwan_config::load_config_from(&config_file(global))?)
}

/// Open the state file and wire the remote collaborators.
async fn build_orchestrator(cfg: &Config, global: &GlobalOpts) -> Result<Orchestrator, CliError> {
    let state = global.state.clone().unwrap_or_else(|| cfg.state_path());
    let store = FileStore::open(&state).await?;

    let transport = cfg.transport();
    let sync_token = meshwan_config::resolve_token("sync", &cfg.sync.auth);
    let issuer_token = meshwan_config::resolve_token("issuer", &cfg.issuer.auth);
    let sync = SyncClient::new(&cfg.sync.url, sync_token.as_ref(), &transport)?;
    let issuer = IssuerClient::new(&cfg.issuer.url, issuer_token.as_ref(), &transport)?;
    let probe = ReachabilityProbe::new(cfg.probe_timeout());

    Ok(Orchestrator::new(
        cfg.to_orchestrator_config(),
        Arc::new(store),
        Collaborators::remote(sync, issuer, probe),
    ))
}
