//! Shared helpers for command handlers.

use std::future::Future;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indicatif::{ProgressBar, ProgressStyle};
use meshwan_core::{GitOpsParam, RegistrationState};
use serde::de::DeserializeOwned;

use crate::cli::{EdgeArgs, GlobalOpts};
use crate::error::CliError;

/// The overlay selected with `--overlay` / `MESHWAN_OVERLAY`.
pub fn overlay(global: &GlobalOpts) -> Result<&str, CliError> {
    global.overlay.as_deref().ok_or(CliError::NoOverlay)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Status line on stderr unless `--quiet`.
pub fn done(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{message}");
    }
}

/// Read and parse a JSON document for `--from-file` flags.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: "from-file".into(),
        reason: format!("invalid JSON in {}: {e}", path.display()),
    })
}

/// Kubeconfig file contents, base64-encoded the way edge objects carry it.
pub fn read_kubeconfig(path: &Path) -> Result<String, CliError> {
    let raw = std::fs::read(path)?;
    Ok(STANDARD.encode(raw))
}

/// Reachability fields shared by hub and device creation.
pub struct EdgeSpec {
    pub public_ips: Vec<String>,
    pub kube_config: Option<String>,
    pub git_ops_param: Option<GitOpsParam>,
}

impl EdgeSpec {
    pub fn from_args(edge: &EdgeArgs) -> Result<Self, CliError> {
        let kube_config = edge
            .kubeconfig
            .as_deref()
            .map(read_kubeconfig)
            .transpose()?;
        let git_ops_param = edge.gitops_type.as_ref().map(|git_ops_type| GitOpsParam {
            git_ops_type: git_ops_type.clone(),
            reference_object: edge.gitops_reference.clone().unwrap_or_default(),
            resource_object: edge.gitops_resource.clone().unwrap_or_default(),
        });
        Ok(Self {
            public_ips: edge.public_ips.clone(),
            kube_config,
            git_ops_param,
        })
    }
}

/// Poll `status` once a second until the registration settles.
pub async fn wait_for_registration<F, Fut>(
    what: &str,
    timeout_secs: u64,
    quiet: bool,
    mut status: F,
) -> Result<(), CliError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(RegistrationState, Option<String>), CliError>>,
{
    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("waiting for {what} to register"));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        let (state, message) = status().await?;
        match state {
            RegistrationState::Success => {
                spinner.finish_with_message(format!("{what} registered"));
                return Ok(());
            }
            RegistrationState::Failed => {
                spinner.abandon();
                return Err(CliError::OperationFailed {
                    message: format!(
                        "{what} registration failed: {}",
                        message.unwrap_or_else(|| "no reason given".into())
                    ),
                });
            }
            RegistrationState::Pending => {
                if let Some(message) = message {
                    spinner.set_message(format!("{what}: {message}"));
                }
            }
        }

        if tokio::time::Instant::now() >= deadline {
            spinner.abandon();
            return Err(CliError::Timeout {
                seconds: timeout_secs,
            });
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
