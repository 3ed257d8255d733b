//! Shared configuration for the meshwan tools.
//!
//! A TOML file merged with `MESHWAN_`-prefixed environment variables,
//! collaborator token resolution (env var, system keyring, plaintext),
//! and translation to `meshwan_core::OrchestratorConfig`. Core never
//! sees these types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use meshwan_api::{TlsMode, TransportConfig};
use meshwan_core::OrchestratorConfig;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keyring service every stored token lives under.
const KEYRING_SERVICE: &str = "meshwan";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("keyring: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// JSON state file; defaults to the platform data directory.
    pub state_path: Option<PathBuf>,

    /// Accept any TLS certificate from the collaborators.
    #[serde(default)]
    pub insecure: bool,

    /// PEM CA bundle for the collaborators.
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub issuer: IssuerSection,

    #[serde(default)]
    pub registration: RegistrationSection,

    #[serde(default)]
    pub deploy: DeploySection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// HTTP timeout for collaborator calls, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// Where a collaborator's bearer token comes from.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct TokenSource {
    /// Plaintext token (prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable holding the token.
    pub token_env: Option<String>,
}

/// Resource synchronization service; also handles cluster registration.
#[derive(Debug, Deserialize, Serialize)]
pub struct SyncSection {
    #[serde(default = "default_sync_url")]
    pub url: String,

    #[serde(flatten)]
    pub auth: TokenSource,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            url: default_sync_url(),
            auth: TokenSource::default(),
        }
    }
}

fn default_sync_url() -> String {
    "http://localhost:9015".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IssuerSection {
    #[serde(default = "default_issuer_url")]
    pub url: String,

    #[serde(flatten)]
    pub auth: TokenSource,

    /// Namespace holding issuers, certificates and secrets.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for IssuerSection {
    fn default() -> Self {
        Self {
            url: default_issuer_url(),
            auth: TokenSource::default(),
            namespace: default_namespace(),
        }
    }
}

fn default_issuer_url() -> String {
    "http://localhost:9016".into()
}
fn default_namespace() -> String {
    OrchestratorConfig::default().cert_namespace
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RegistrationSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_secs: u64,

    /// Per-IP timeout when probing an edge cluster.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for RegistrationSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            cancel_grace_secs: default_cancel_grace(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}
fn default_cancel_grace() -> u64 {
    2
}
fn default_probe_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeploySection {
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,

    #[serde(default = "default_uninstall_timeout")]
    pub uninstall_timeout_secs: u64,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            install_timeout_secs: default_install_timeout(),
            uninstall_timeout_secs: default_uninstall_timeout(),
        }
    }
}

fn default_install_timeout() -> u64 {
    600
}
fn default_uninstall_timeout() -> u64 {
    10
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "meshwan", "meshwan")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// State file used when `state_path` is not configured.
pub fn default_state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("state.json"),
        |dirs| dirs.data_dir().join("state.json"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("meshwan");
    p
}

// ── Loading and saving ──────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file is not an error.
///
/// Nested keys use a double underscore: `MESHWAN_SYNC__URL` sets `sync.url`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MESHWAN_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("sync.url", &self.sync.url), ("issuer.url", &self.issuer.url)] {
            url::Url::parse(value).map_err(|e| ConfigError::Validation {
                field: field.into(),
                reason: format!("invalid URL '{value}': {e}"),
            })?;
        }
        if self.registration.poll_interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "registration.poll_interval_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_path.clone().unwrap_or_else(default_state_path)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.registration.probe_timeout_secs)
    }

    /// HTTP transport shared by the sync and issuer clients.
    pub fn transport(&self) -> TransportConfig {
        let tls = if self.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca_path) = self.ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else {
            TlsMode::System
        };
        TransportConfig {
            tls,
            timeout: Duration::from_secs(self.defaults.timeout),
        }
    }

    /// The single boundary where config types cross into core types.
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            cert_namespace: self.issuer.namespace.clone(),
            poll_interval: Duration::from_secs(self.registration.poll_interval_secs),
            cancel_grace: Duration::from_secs(self.registration.cancel_grace_secs),
            install_timeout: Duration::from_secs(self.deploy.install_timeout_secs),
            uninstall_timeout: Duration::from_secs(self.deploy.uninstall_timeout_secs),
            ..OrchestratorConfig::default()
        }
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Keyring account for a collaborator's token, e.g. `sync/token`.
fn keyring_account(service: &str) -> String {
    format!("{service}/token")
}

/// Resolve a collaborator token. `None` means the collaborator is
/// called without an `Authorization` header.
pub fn resolve_token(service: &str, source: &TokenSource) -> Option<SecretString> {
    // 1. Configured env var
    if let Some(ref env_name) = source.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_account(service)) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    source.token.clone().map(SecretString::from)
}

/// Store a collaborator token in the system keyring.
pub fn store_token(service: &str, token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_account(service))?;
    entry.set_password(token)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use secrecy::ExposeSecret;

    use super::*;

    fn load(path: &str) -> figment::error::Result<Config> {
        load_config_from(Path::new(path)).map_err(|e| e.to_string().into())
    }

    #[test]
    fn defaults_apply_without_a_file() {
        Jail::expect_with(|_jail| {
            let cfg = load("missing.toml")?;
            assert_eq!(cfg.sync.url, "http://localhost:9015");
            assert_eq!(cfg.issuer.namespace, "meshwan-system");
            assert_eq!(cfg.defaults.output, "table");

            let core = cfg.to_orchestrator_config();
            assert_eq!(core.poll_interval, Duration::from_secs(5));
            assert_eq!(core.install_timeout, Duration::from_secs(600));
            assert_eq!(core.root_issuer, "meshwan-root-issuer");
            Ok(())
        });
    }

    #[test]
    fn file_values_and_env_overrides_merge() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                state_path = "/var/lib/meshwan/state.json"

                [sync]
                url = "https://sync.example:9015"
                token_env = "SYNC_TOKEN"

                [registration]
                poll_interval_secs = 9
                "#,
            )?;
            jail.set_env("MESHWAN_ISSUER__NAMESPACE", "edge-certs");
            jail.set_env("MESHWAN_DEPLOY__INSTALL_TIMEOUT_SECS", "30");

            let cfg = load("config.toml")?;
            assert_eq!(cfg.state_path(), PathBuf::from("/var/lib/meshwan/state.json"));
            assert_eq!(cfg.sync.url, "https://sync.example:9015");
            assert_eq!(cfg.sync.auth.token_env.as_deref(), Some("SYNC_TOKEN"));

            let core = cfg.to_orchestrator_config();
            assert_eq!(core.cert_namespace, "edge-certs");
            assert_eq!(core.poll_interval, Duration::from_secs(9));
            assert_eq!(core.install_timeout, Duration::from_secs(30));
            Ok(())
        });
    }

    #[test]
    fn invalid_url_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[issuer]\nurl = \"not a url\"\n")?;
            let err = load_config_from(Path::new("config.toml")).unwrap_err();
            assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "issuer.url"));
            Ok(())
        });
    }

    #[test]
    fn token_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("MESHWAN_TEST_SYNC_TOKEN", "from-env");
            let source = TokenSource {
                token: Some("plain".into()),
                token_env: Some("MESHWAN_TEST_SYNC_TOKEN".into()),
            };
            let token = resolve_token("sync", &source).unwrap();
            assert_eq!(token.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn insecure_overrides_custom_ca() {
        let cfg = Config {
            insecure: true,
            ca_cert: Some(PathBuf::from("/etc/ca.pem")),
            ..Config::default()
        };
        assert!(matches!(cfg.transport().tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(cfg.transport().timeout, Duration::from_secs(30));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.issuer.url = "https://issuer.example".into();
        cfg.registration.probe_timeout_secs = 3;
        save_config_to(&cfg, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let back: Config = toml::from_str(&raw).unwrap();
        assert_eq!(back.issuer.url, "https://issuer.example");
        assert_eq!(back.probe_timeout(), Duration::from_secs(3));
    }
}
