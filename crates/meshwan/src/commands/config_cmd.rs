//! Config subcommand handlers.

use dialoguer::Password;
use meshwan_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat, TokenService};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

/// Replace plaintext tokens before the config leaves the process.
fn redact(mut cfg: Config) -> Config {
    for auth in [&mut cfg.sync.auth, &mut cfg.issuer.auth] {
        if auth.token.is_some() {
            auth.token = Some(MASK.into());
        }
    }
    cfg
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn service_name(service: TokenService) -> &'static str {
    match service {
        TokenService::Sync => "sync",
        TokenService::Issuer => "issuer",
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = redact(crate::load_config(global)?);
            let out = match global.output {
                OutputFormat::Table => {
                    toml::to_string_pretty(&cfg).map_err(config::ConfigError::from)?
                }
                format => output::render_single(format, &cfg, |_| String::new(), |_| {
                    crate::config_file(global).display().to_string()
                }),
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", crate::config_file(global).display());
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = crate::config_file(global);
            if path.exists() && !force {
                return Err(CliError::AlreadyExists {
                    resource_type: "Config file".into(),
                    identifier: path.display().to_string(),
                });
            }
            config::save_config_to(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("✓ Wrote {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::SetToken { service } => {
            let name = service_name(service);
            let token = Password::new()
                .with_prompt(format!("{name} token"))
                .interact()
                .map_err(prompt_err)?;
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            config::store_token(name, &token)?;
            if !global.quiet {
                eprintln!("✓ {name} token stored in system keyring");
            }
            Ok(())
        }
    }
}
